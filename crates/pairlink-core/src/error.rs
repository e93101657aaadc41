//! Error types for the pairlink relay and its asset responder

use thiserror::Error;

/// Relay-level errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("server full (maximum {capacity} clients)")]
    ServerFull { capacity: usize },

    #[error("send to {peer_id} failed: {reason}")]
    SendFailed { peer_id: String, reason: String },

    #[error("participant id generation failed: {0}")]
    IdGeneration(#[from] getrandom::Error),
}

impl RelayError {
    /// Whether this error is the capacity policy rejecting a new connection
    pub fn is_server_full(&self) -> bool {
        matches!(self, RelayError::ServerFull { .. })
    }
}

/// Errors produced while resolving and reading a static asset
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("path rejected: {0}")]
    PathRejected(String),

    #[error("asset read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    /// HTTP status code this error is reported with
    pub fn status(&self) -> u16 {
        match self {
            AssetError::NotFound(_) | AssetError::PathRejected(_) => 404,
            AssetError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => 404,
            AssetError::Io(_) => 500,
        }
    }
}

/// Errors while reading an HTTP request head off a fresh connection
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request head exceeds {max} bytes")]
    HeadTooLarge { max: usize },

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("connection closed before request head completed")]
    Incomplete,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_full_display() {
        let err = RelayError::ServerFull { capacity: 2 };
        assert!(err.is_server_full());
        assert_eq!(err.to_string(), "server full (maximum 2 clients)");
    }

    #[test]
    fn test_asset_error_status() {
        assert_eq!(AssetError::NotFound("x.html".into()).status(), 404);
        assert_eq!(AssetError::PathRejected("..".into()).status(), 404);

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(AssetError::from(missing).status(), 404);

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(AssetError::from(denied).status(), 500);
    }
}
