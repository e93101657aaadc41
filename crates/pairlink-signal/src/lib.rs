//! pairlink signal server
//!
//! Two-party signaling relay for a browser-to-browser media session, sharing
//! its listening port with the static pages both parties load.
//!
//! # Protocol
//!
//! 1. Streamer and viewer load their pages over plain HTTP
//! 2. Each page opens a WebSocket to the same port
//! 3. At most two sockets are admitted; a third is closed with 1008
//! 4. Every frame one participant sends is forwarded verbatim to the other
//! 5. Once the media connection is up the sockets can be dropped

pub mod assets;
pub mod http;
pub mod link;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod server;

pub use assets::AssetResponder;
pub use link::{LinkState, PeerLink, WsLink};
pub use messages::{summarize, MessageSummary};
pub use registry::{Participant, Registry};
pub use relay::{Departure, Relay};
pub use server::RelayServer;

pub use pairlink_core::{DEFAULT_PORT, MAX_PARTICIPANTS};
