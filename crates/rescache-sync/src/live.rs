//! Live notification channel.
//!
//! A WebSocket subscription to the ledger's block update listener. It never
//! carries blocks itself; an `"Update blocks"` message only triggers a pass.

use crate::backoff::ReconnectPolicy;
use crate::engine::EngineInner;
use crate::error::SyncError;
use crate::event::{ErrorKind, LiveMessage, LiveState, SyncEvent, ABNORMAL_CLOSURE};
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type LedgerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code when no status was present in the close frame.
const NO_STATUS: u16 = 1005;

/// Close code used when the engine shuts the channel down.
const NORMAL_CLOSURE: u16 = 1000;

impl EngineInner {
    /// Connects, listens, and reconnects with backoff until cancelled.
    pub(crate) async fn run_live(
        self: Arc<Self>,
        endpoint: String,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) {
        let mut attempts: u32 = 0;

        loop {
            self.set_live_state(LiveState::Connecting);
            debug!(endpoint = %endpoint, "Connecting to block update listener");

            // Not raced against cancellation; close() waits for this attempt.
            let attempt =
                tokio::time::timeout(connect_timeout, connect_async(endpoint.as_str())).await;

            match attempt {
                Ok(Ok((socket, _response))) => {
                    if self.cancel.is_cancelled() {
                        self.close_socket(socket).await;
                        break;
                    }

                    attempts = 0;
                    self.set_live_state(LiveState::Connected);
                    info!(endpoint = %endpoint, "Connected to block update listener");
                    self.hub.emit(SyncEvent::Connected);

                    let (code, reason) = self.listen(socket).await;
                    self.set_live_state(LiveState::Disconnected);
                    warn!(code, reason = %reason, "Block update listener closed");
                    self.hub.emit(SyncEvent::Disconnected { code, reason });
                }
                Ok(Err(e)) => self.connection_failed(SyncError::from(e)),
                Err(_) => self.connection_failed(SyncError::WebSocket(format!(
                    "connection attempt timed out after {}ms",
                    connect_timeout.as_millis()
                ))),
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let delay = policy.delay_for_attempt(attempts);
            attempts = attempts.saturating_add(1);
            self.counters
                .reconnect_attempts
                .fetch_add(1, Ordering::Relaxed);
            info!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to block update listener"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_live_state(LiveState::Disconnected);
        debug!("Live channel stopped");
    }

    fn connection_failed(&self, error: SyncError) {
        self.set_live_state(LiveState::Disconnected);
        warn!(error = %error, "Could not connect to block update listener");
        self.hub.emit(SyncEvent::error(ErrorKind::Channel, &error));
        self.hub.emit(SyncEvent::Disconnected {
            code: ABNORMAL_CLOSURE,
            reason: error.to_string(),
        });
    }

    /// Reads messages until the socket closes or the engine is cancelled.
    ///
    /// Returns the close code and reason.
    async fn listen(&self, mut socket: LedgerSocket) -> (u16, String) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = socket.close(None).await {
                        debug!(error = %e, "Error closing block update listener");
                    }
                    return (NORMAL_CLOSURE, "engine closing".to_string());
                }
                message = socket.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_message(text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => self.handle_message(text),
                        Err(_) => debug!(len = data.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        // Sends the queued close reply.
                        if let Err(e) = socket.close(None).await {
                            debug!(error = %e, "Error answering close frame");
                        }
                        return frame.map_or((NO_STATUS, String::new()), |f| {
                            (u16::from(f.code), f.reason.as_str().to_string())
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let error = SyncError::from(e);
                        self.hub.emit(SyncEvent::error(ErrorKind::Channel, &error));
                        return (ABNORMAL_CLOSURE, error.to_string());
                    }
                    None => return (ABNORMAL_CLOSURE, String::new()),
                }
            }
        }
    }

    async fn close_socket(&self, mut socket: LedgerSocket) {
        debug!("Closing connection opened during shutdown");
        if let Err(e) = socket.close(None).await {
            debug!(error = %e, "Error closing block update listener");
        }
        self.set_live_state(LiveState::Disconnected);
        self.hub.emit(SyncEvent::Disconnected {
            code: NORMAL_CLOSURE,
            reason: "engine closing".to_string(),
        });
    }

    fn handle_message(&self, text: &str) {
        let message = LiveMessage::parse(text);
        if message.is_update() {
            debug!("Received block update notification");
            self.request_pass();
        } else {
            warn!(kind = %message.kind, "Ignoring unknown message type");
        }
    }
}
