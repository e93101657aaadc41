//! Relay session manager
//!
//! Admits up to two participants, forwards every data frame from one to the
//! other, and keeps the registry in step with transport liveness.
//!
//! No "peer left" message is ever sent: the remaining participant learns of a
//! departure from its own transport or from the next relay attempt.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use pairlink_core::{generate_participant_id, RelayConfig, RelayError, MAX_PARTICIPANTS};

use crate::link::{LinkState, PeerLink};
use crate::messages::summarize;
use crate::registry::{Participant, Registry};

/// Maximum user agent length kept for logging
const USER_AGENT_LOG_LEN: usize = 100;

/// Why a participant left
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Departure {
    /// The peer sent a close frame
    Closed { code: u16, reason: String },
    /// The stream ended without a close frame
    Ended,
    /// The transport reported an error
    Error(String),
}

impl Departure {
    /// Departure for a received close frame (absent frame means no status)
    pub fn from_close_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Departure::Closed {
                code: frame.code.into(),
                reason: frame.reason.to_string(),
            },
            None => Departure::Closed {
                code: CloseCode::Status.into(),
                reason: String::new(),
            },
        }
    }
}

/// Owns the participant registry and runs admission, relay and disconnection
pub struct Relay {
    registry: Registry,
    rejection_reason: String,
}

impl Relay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            registry: Registry::new(MAX_PARTICIPANTS),
            rejection_reason: config.rejection_reason.clone(),
        }
    }

    /// Admit a freshly upgraded connection, or close it with 1008 when full.
    ///
    /// Returns the new participant's id.
    pub async fn admit(
        &self,
        link: Arc<dyn PeerLink>,
        addr: SocketAddr,
        user_agent: Option<String>,
    ) -> Result<String, RelayError> {
        let id = match generate_participant_id() {
            Ok(id) => id,
            Err(e) => {
                error!("Cannot assign id to client from {}: {}", addr, e);
                let _ = link.close(CloseCode::Error, "internal error").await;
                return Err(e.into());
            }
        };

        let agent = user_agent.as_deref().unwrap_or("Unknown").to_string();
        let participant = Participant::new(id.clone(), addr, user_agent, link.clone());
        let admission = self.registry.admit(participant);

        for stale in &admission.swept {
            info!(client_id = %stale.id, "Cleaning up closed client");
        }

        match admission.result {
            Ok(total) => {
                info!(
                    event = "connected",
                    client_id = %id,
                    addr = %addr,
                    total,
                    user_agent = truncate(&agent, USER_AGENT_LOG_LEN),
                    "Client connected"
                );
                Ok(id)
            }
            Err(e) => {
                warn!(
                    addr = %addr,
                    total = self.registry.len(),
                    "Too many clients, closing new connection"
                );
                if let Err(close_err) = link.close(CloseCode::Policy, &self.rejection_reason).await {
                    debug!("Close handshake to rejected client {} failed: {}", addr, close_err);
                }
                Err(e)
            }
        }
    }

    /// Forward one data frame from `sender` to the other open participant.
    ///
    /// Returns the number of deliveries (0 or 1). Control frames are ignored.
    pub async fn relay(&self, sender: &str, message: Message) -> usize {
        let payload: &[u8] = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes,
            _ => return 0,
        };

        match summarize(payload) {
            Some(summary) => info!(client_id = %sender, "Message from {}: {}", sender, summary),
            None => debug!(
                client_id = %sender,
                len = payload.len(),
                "Message from {} is not a recognized signal, relaying as-is",
                sender
            ),
        }

        let targets = self.registry.targets(sender);
        let Some(target) = targets.first() else {
            info!(client_id = %sender, "No target clients available for relay");
            info!(relayed = 0, "Relayed to 0 clients");
            return 0;
        };

        if targets.len() > 1 {
            warn!(
                targets = targets.len(),
                "Multiple target clients, only relaying to first one"
            );
        }

        let delivered = match target.link.send(message).await {
            Ok(()) => 1,
            Err(e) => {
                let err = RelayError::SendFailed {
                    peer_id: target.id.clone(),
                    reason: e.to_string(),
                };
                warn!(client_id = %sender, "{}", err);
                target.link.advance(LinkState::Closing);
                0
            }
        };

        info!(relayed = delivered, "Relayed to {} clients", delivered);
        delivered
    }

    /// Remove a participant after its transport closed or failed.
    ///
    /// Idempotent; returns whether an entry was actually removed.
    pub fn disconnect(&self, id: &str, departure: &Departure) -> bool {
        match departure {
            Departure::Closed { code, reason } => {
                info!(client_id = %id, code, "Client disconnected - Reason: {}", reason)
            }
            Departure::Ended => info!(client_id = %id, "Client disconnected"),
            Departure::Error(e) => error!(client_id = %id, "WebSocket error: {}", e),
        }

        let removed = self.registry.remove(id);
        match &removed {
            Some(participant) => {
                participant.link().advance(LinkState::Closed);
                info!(
                    client_id = %id,
                    session_secs = participant.session_duration().num_seconds(),
                    "Client cleanup: success"
                );
            }
            None => debug!(client_id = %id, "Client cleanup: already removed"),
        }

        info!(total = self.registry.len(), "Total connected clients");
        removed.is_some()
    }

    /// Number of registered participants
    pub fn participant_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of registered participants in admission order
    pub fn participant_ids(&self) -> Vec<String> {
        self.registry.ids()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
