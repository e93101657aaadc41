//! Minimal HTTP/1.1 handling for the shared listener
//!
//! Reads one request head off a fresh connection and decides whether it is a
//! WebSocket upgrade or a plain page request. Responses are always
//! `Connection: close`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use pairlink_core::{HttpError, MAX_REQUEST_HEAD};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Pause between peeks while a request head is still arriving
const PEEK_INTERVAL: Duration = Duration::from_millis(10);

/// Parsed request line and headers
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a request head (request line plus header lines)
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| HttpError::Malformed("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HttpError::Malformed(format!(
                "bad request line: {:?}",
                request_line
            )));
        };

        if !version.starts_with("HTTP/") {
            return Err(HttpError::Malformed(format!("bad version: {:?}", version)));
        }

        let mut headers = Vec::new();
        for line in lines.take_while(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::Malformed(format!("bad header: {:?}", line)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// The client's `Sec-WebSocket-Key`
    pub fn websocket_key(&self) -> Option<&str> {
        self.header("sec-websocket-key")
    }

    /// `GET` with `Upgrade: websocket`, `Connection: upgrade` and a key
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == "GET"
            && header_has_token(self.header("upgrade"), "websocket")
            && header_has_token(self.header("connection"), "upgrade")
            && self.websocket_key().is_some()
    }
}

fn header_has_token(value: Option<&str>, token: &str) -> bool {
    value.is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
}

/// Parse the request head without consuming it, so a WebSocket handshake can
/// still read it off the socket.
pub async fn peek_request_head(stream: &TcpStream) -> Result<RequestHead, HttpError> {
    let mut buf = vec![0u8; MAX_REQUEST_HEAD];
    let mut seen = 0;

    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Err(HttpError::Incomplete);
        }

        if let Some(end) = find(&buf[..n], HEAD_TERMINATOR) {
            let raw = std::str::from_utf8(&buf[..end])
                .map_err(|_| HttpError::Malformed("request head is not UTF-8".into()))?;
            return RequestHead::parse(raw);
        }

        if n == buf.len() {
            return Err(HttpError::HeadTooLarge {
                max: MAX_REQUEST_HEAD,
            });
        }

        // peek returns at once while unread data sits in the socket
        if n == seen {
            tokio::time::sleep(PEEK_INTERVAL).await;
        }
        seen = n;
    }
}

/// Read bytes until the blank line that ends the request head.
///
/// Nothing past the head is expected: page requests carry no body and
/// WebSocket clients wait for the 101 before sending frames.
pub async fn read_request_head<S>(stream: &mut S) -> Result<RequestHead, HttpError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HttpError::Incomplete);
        }

        // Only the tail can contain a terminator split across reads.
        let search_from = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find(&buf[search_from..], HEAD_TERMINATOR) {
            let end = search_from + pos;
            let raw = std::str::from_utf8(&buf[..end])
                .map_err(|_| HttpError::Malformed("request head is not UTF-8".into()))?;
            return RequestHead::parse(raw);
        }

        if buf.len() > MAX_REQUEST_HEAD {
            return Err(HttpError::HeadTooLarge {
                max: MAX_REQUEST_HEAD,
            });
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// An HTTP response ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    /// Send headers only (HEAD request)
    pub head_only: bool,
}

impl Response {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
            head_only: false,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn without_body(mut self) -> Self {
        self.head_only = true;
        self
    }

    pub fn bad_request() -> Self {
        Self::new(400, "text/plain", "400 Bad Request")
    }

    pub fn head_too_large() -> Self {
        Self::new(431, "text/plain", "431 Request Header Fields Too Large")
    }

    /// Serialize status line, headers and (unless `head_only`) body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));

        let mut bytes = out.into_bytes();
        if !self.head_only {
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }

    pub async fn write_to<S>(&self, stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.to_bytes()).await?;
        stream.flush().await
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
