//! Events emitted by the sync engine.

use serde::{Deserialize, Serialize};

/// WebSocket close code reported when the connection was lost abnormally.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Message type that asks the engine to re-sync.
pub const UPDATE_BLOCKS: &str = "Update blocks";

/// Where a non-fatal error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Scanning or fetching a page from the ledger.
    Fetch,
    /// Writing blocks to the store.
    Storage,
    /// The live WebSocket channel.
    Channel,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Storage => "storage",
            Self::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

/// A lifecycle or error notification from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The live channel opened.
    Connected,
    /// The live channel closed.
    Disconnected {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A non-fatal error. The engine keeps running.
    Error {
        /// Where the error happened.
        kind: ErrorKind,
        /// Human readable description.
        message: String,
    },
    /// Shutdown completed.
    Closed,
}

impl SyncEvent {
    /// Creates an error event.
    pub fn error(kind: ErrorKind, message: impl std::fmt::Display) -> Self {
        Self::Error {
            kind,
            message: message.to_string(),
        }
    }
}

/// State of the live channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    /// Not connected; waiting to (re)connect or shut down.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The channel is open.
    Connected,
}

impl LiveState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// A message received on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Message type, e.g. `"Update blocks"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LiveMessage {
    /// Parses a text frame. Text that is not a JSON message becomes the type.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self {
            kind: text.to_string(),
            data: None,
        })
    }

    /// Returns true if this message asks for a re-sync.
    pub fn is_update(&self) -> bool {
        self.kind == UPDATE_BLOCKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_message() {
        let msg = LiveMessage::parse(r#"{"type":"Update blocks","data":{"count":2}}"#);
        assert!(msg.is_update());
        assert_eq!(msg.data.unwrap()["count"], 2);
    }

    #[test]
    fn test_parse_raw_text_message() {
        assert!(LiveMessage::parse("Update blocks").is_update());

        let msg = LiveMessage::parse("hello");
        assert_eq!(msg.kind, "hello");
        assert!(!msg.is_update());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(SyncEvent::Disconnected {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        })
        .unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["code"], 1006);

        let json = serde_json::to_value(SyncEvent::error(ErrorKind::Fetch, "boom")).unwrap();
        assert_eq!(json["kind"], "fetch");
    }

    #[test]
    fn test_live_state_roundtrip() {
        for state in [
            LiveState::Disconnected,
            LiveState::Connecting,
            LiveState::Connected,
        ] {
            assert_eq!(LiveState::from_u8(state.as_u8()), state);
        }
    }
}
