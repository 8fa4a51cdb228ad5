//! Ledger block and transaction types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A block mirrored from the remote ledger.
///
/// Fields this crate does not interpret (`number`, `createdAtEpoch`, ...) are
/// kept in [`Block::extra`] so the mirrored document matches the remote one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Monotonic, 1-based block number. Missing ids decode as 0.
    #[serde(default)]
    pub id: u64,
    /// Transactions contained in the block.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Creation time as reported by the ledger (human readable, GMT).
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    /// Block size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// Creates a block with the given id and no transactions.
    pub fn new(id: u64, created_at: impl Into<String>) -> Self {
        Self {
            id,
            transactions: Vec::new(),
            created_at: created_at.into(),
            size: None,
            extra: Map::new(),
        }
    }

    /// Adds a transaction, builder style.
    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    /// Number of transactions in the block.
    pub fn volume(&self) -> usize {
        self.transactions.len()
    }

    /// Creation time in microseconds since the Unix epoch, when the ledger
    /// supplied the `createdAtEpoch` field.
    pub fn created_at_epoch(&self) -> Option<i64> {
        match self.extra.get("createdAtEpoch")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Parses JSON-looking transaction values into structured values.
    ///
    /// Values that fail to parse are kept as their original text.
    pub fn normalize_values(mut self) -> Self {
        for transaction in &mut self.transactions {
            transaction.normalize_value();
        }
        self
    }
}

/// A single transaction inside a [`Block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Command executed (e.g. `SET`).
    #[serde(default)]
    pub cmd: String,
    /// Key operated on.
    #[serde(default)]
    pub key: String,
    /// Associated value, absent for commands that carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TransactionValue>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// Creates a transaction carrying a raw text value.
    pub fn text(cmd: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            key: key.into(),
            value: Some(TransactionValue::Text(value.into())),
            extra: Map::new(),
        }
    }

    /// Replaces a JSON-looking text value by its parsed form.
    pub fn normalize_value(&mut self) {
        let Some(raw) = self.value.as_ref().and_then(TransactionValue::as_text) else {
            return;
        };
        if !looks_like_json(raw) {
            return;
        }
        match try_parse_json(raw) {
            Ok(parsed) => self.value = Some(TransactionValue::Structured(parsed)),
            Err(_) => {
                tracing::warn!(
                    key = %self.key,
                    "Could not parse transaction value, keeping original text"
                );
            }
        }
    }
}

/// A transaction value: raw text as sent by the ledger, or parsed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionValue {
    /// Text value, kept exactly as received.
    Text(String),
    /// Structured value (either received as such or parsed from text).
    Structured(Value),
}

impl TransactionValue {
    /// Returns the text form if this value was not parsed.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(_) => None,
        }
    }

    /// Returns true if this value holds structured JSON.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

/// Returns true when the trimmed text is delimited like a JSON object or array.
pub fn looks_like_json(raw: &str) -> bool {
    let trimmed = raw.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

/// Attempts to parse a JSON object or array out of `raw`.
///
/// Returns the original string when it is not delimited like JSON or when
/// parsing fails; scalars such as `"42"` are never parsed.
pub fn try_parse_json(raw: &str) -> Result<Value, &str> {
    if !looks_like_json(raw) {
        return Err(raw);
    }
    serde_json::from_str(raw).map_err(|_| raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_try_parse_json_object_and_array() {
        assert_eq!(try_parse_json(r#"{"a":1}"#), Ok(json!({"a": 1})));
        assert_eq!(try_parse_json("  [1, 2] "), Ok(json!([1, 2])));
    }

    #[test]
    fn test_try_parse_json_keeps_original() {
        assert_eq!(try_parse_json("42"), Err("42"));
        assert_eq!(try_parse_json("hello"), Err("hello"));
        assert_eq!(try_parse_json("{not json}"), Err("{not json}"));
    }

    #[test]
    fn test_block_deserialize_preserves_extra_fields() {
        let raw = json!({
            "id": 7,
            "number": "7",
            "transactions": [{"cmd": "SET", "key": "k", "value": "v"}],
            "size": 120,
            "createdAt": "2024/05/01 10:00:00 GMT",
            "createdAtEpoch": 1714557600000000_i64
        });

        let block: Block = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.id, 7);
        assert_eq!(block.volume(), 1);
        assert_eq!(block.size, Some(120));
        assert_eq!(block.created_at_epoch(), Some(1_714_557_600_000_000));

        let back = serde_json::to_value(&block).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_block_missing_id_defaults_to_zero() {
        let block: Block = serde_json::from_value(json!({"transactions": []})).unwrap();
        assert_eq!(block.id, 0);
        assert!(block.created_at.is_empty());
    }

    #[test]
    fn test_normalize_values() {
        let block = Block::new(1, "t")
            .with_transaction(Transaction::text("SET", "a", r#"{"amount": 5}"#))
            .with_transaction(Transaction::text("SET", "b", "plain"))
            .with_transaction(Transaction::text("SET", "c", "[broken"))
            .with_transaction(Transaction::text("SET", "d", "{broken}"))
            .normalize_values();

        let values: Vec<_> = block
            .transactions
            .iter()
            .map(|t| t.value.clone().unwrap())
            .collect();
        assert_eq!(values[0], TransactionValue::Structured(json!({"amount": 5})));
        assert_eq!(values[1].as_text(), Some("plain"));
        assert_eq!(values[2].as_text(), Some("[broken"));
        assert_eq!(values[3].as_text(), Some("{broken}"));
    }

    #[test]
    fn test_structured_value_deserializes_as_structured() {
        let tx: Transaction =
            serde_json::from_value(json!({"cmd": "SET", "key": "k", "value": {"x": 1}})).unwrap();
        assert!(tx.value.unwrap().is_structured());
    }

    #[test]
    fn test_transaction_without_value() {
        let mut tx: Transaction =
            serde_json::from_value(json!({"cmd": "GET", "key": "k"})).unwrap();
        tx.normalize_value();
        assert!(tx.value.is_none());
        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back, json!({"cmd": "GET", "key": "k"}));
    }
}
