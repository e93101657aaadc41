//! Static page responder
//!
//! Serves the streamer and viewer pages from the asset root. Only `GET` and
//! `HEAD` are answered; there is no caching, range support or directory index
//! beyond `/` → `index.html`.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use pairlink_core::path::resolve_request_path;
use pairlink_core::AssetError;

use crate::http::{RequestHead, Response};

/// Maximum user agent length shown in the request log
const USER_AGENT_LOG_LEN: usize = 50;

/// A file loaded from the asset root
#[derive(Debug)]
pub struct Asset {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Maps request paths to files below a root directory
pub struct AssetResponder {
    root: PathBuf,
}

impl AssetResponder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Answer a non-upgrade request
    pub async fn respond(&self, head: &RequestHead) -> Response {
        info!(
            "{} {} - {}",
            head.method,
            head.target,
            head.user_agent()
                .map(|ua| ua.chars().take(USER_AGENT_LOG_LEN).collect::<String>())
                .unwrap_or_else(|| "Unknown".to_string())
        );

        let head_only = match head.method.as_str() {
            "GET" => false,
            "HEAD" => true,
            _ => {
                return Response::new(405, "text/plain", "405 Method Not Allowed")
                    .with_header("Allow", "GET, HEAD")
            }
        };

        let response = match self.load(&head.target).await {
            Ok(asset) => Response::new(200, asset.content_type, asset.bytes),
            Err(e) => error_response(&e),
        };

        if head_only {
            response.without_body()
        } else {
            response
        }
    }

    /// Resolve and read the file a request target refers to
    pub async fn load(&self, target: &str) -> Result<Asset, AssetError> {
        let path = resolve_request_path(&self.root, target)?;

        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Err(AssetError::NotFound(target.to_string()));
        }

        let bytes = tokio::fs::read(&path).await?;
        Ok(Asset {
            content_type: content_type(&path),
            bytes,
        })
    }
}

fn error_response(error: &AssetError) -> Response {
    match error {
        AssetError::Io(e) if error.status() == 500 => {
            warn!("Asset read failed: {}", e);
            Response::new(500, "text/plain", format!("Server Error: {:?} ..\n", e.kind()))
        }
        _ => {
            debug!("Asset not served: {}", error);
            Response::new(404, "text/html", "404 Not Found")
        }
    }
}

/// Content type for a file, by lowercase extension
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" => "text/html",
        "js" => "text/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" => "image/jpg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "woff" => "application/font-woff",
        "ttf" => "application/font-ttf",
        "eot" => "application/vnd.ms-fontobject",
        "otf" => "application/font-otf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
