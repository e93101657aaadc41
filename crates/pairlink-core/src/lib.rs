//! pairlink core - configuration, errors, identifiers and path handling
//!
//! Shared by the relay server and its binary. Nothing in this crate touches
//! the network.

pub mod config;
pub mod error;
pub mod id;
pub mod path;

use std::time::Duration;

pub use config::{Config, RelayConfig, ServerConfig};
pub use error::*;
pub use id::generate_participant_id;

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Maximum number of live participants (one streamer, one viewer)
pub const MAX_PARTICIPANTS: usize = 2;

/// Close reason sent when the capacity policy rejects a connection
pub const SERVER_FULL_REASON: &str = "Server full - maximum 2 clients allowed";

/// File served for `/`
pub const INDEX_FILE: &str = "index.html";

/// Maximum request path length in bytes
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum filename length in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Maximum size of an HTTP request head (16 KB)
pub const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// How long a rejected connection may take to answer the 1008 close frame
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a fresh connection may take to send its request head
pub const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);
