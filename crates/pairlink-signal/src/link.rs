//! Transport handles for admitted participants
//!
//! The relay never owns a socket directly. It holds a [`PeerLink`] per
//! participant, which reports the transport state and accepts outbound frames.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Transport state of one connection
///
/// Transitions only move forward: `Connecting → Open → Closing → Closed`,
/// with `Open → Closed` allowed directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LinkState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Connecting,
            1 => LinkState::Open,
            2 => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }

    /// Closing or closed; the registry sweeps such entries
    pub fn is_stale(self) -> bool {
        self >= LinkState::Closing
    }
}

/// Monotonic state cell shared between a connection task and the relay
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance to `state`; a request to move backwards is ignored
    pub fn advance(&self, state: LinkState) -> LinkState {
        LinkState::from_u8(self.0.fetch_max(state as u8, Ordering::AcqRel).max(state as u8))
    }
}

/// One participant's transport, as seen by the relay
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Current transport state
    fn state(&self) -> LinkState;

    /// Move the transport state forward
    fn advance(&self, state: LinkState);

    /// Deliver one frame. Failures are not retried by the caller.
    async fn send(&self, message: Message) -> Result<(), WsError>;

    /// Start the close handshake with the given status and reason
    async fn close(&self, code: CloseCode, reason: &str) -> Result<(), WsError>;
}

/// [`PeerLink`] over the write half of a server-side WebSocket
pub struct WsLink<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    state: StateCell,
}

impl<S> WsLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a sink whose handshake has already completed
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            state: StateCell::new(LinkState::Open),
        }
    }
}

#[async_trait]
impl<S> PeerLink for WsLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn state(&self) -> LinkState {
        self.state.get()
    }

    fn advance(&self, state: LinkState) {
        self.state.advance(state);
    }

    async fn send(&self, message: Message) -> Result<(), WsError> {
        let result = self.sink.lock().await.send(message).await;
        if result.is_err() {
            self.state.advance(LinkState::Closing);
        }
        result
    }

    async fn close(&self, code: CloseCode, reason: &str) -> Result<(), WsError> {
        self.state.advance(LinkState::Closing);
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        self.sink.lock().await.send(Message::Close(Some(frame))).await
    }
}
