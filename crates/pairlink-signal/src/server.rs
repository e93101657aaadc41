//! Shared-port server: static pages and the WebSocket relay on one listener

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response as UpgradeResponse,
};
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use pairlink_core::{Config, HttpError, CLOSE_DRAIN_TIMEOUT, REQUEST_HEAD_TIMEOUT};

use crate::assets::AssetResponder;
use crate::http::{peek_request_head, read_request_head, Response};
use crate::link::{LinkState, PeerLink, WsLink};
use crate::relay::{Departure, Relay};

/// Relay server state
pub struct RelayServer {
    relay: Arc<Relay>,
    assets: Arc<AssetResponder>,
}

impl RelayServer {
    pub fn new(config: &Config) -> Self {
        Self {
            relay: Arc::new(Relay::new(&config.relay)),
            assets: Arc::new(AssetResponder::new(config.server.asset_root.clone())),
        }
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        self.serve_listener(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let relay = self.relay.clone();
            let assets = self.assets.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, relay, assets).await {
                    debug!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    /// Shared handle to the relay (for monitoring)
    pub fn relay(&self) -> Arc<Relay> {
        self.relay.clone()
    }

    /// Number of registered participants
    pub fn participant_count(&self) -> usize {
        self.relay.participant_count()
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

/// Handle a single connection (page request or WebSocket)
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,
    assets: Arc<AssetResponder>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek so the handshake can still read the head
    let peeked = match timeout(REQUEST_HEAD_TIMEOUT, peek_request_head(&stream)).await {
        Ok(peeked) => peeked,
        Err(_) => {
            debug!("No request head from {} within {:?}", peer_addr, REQUEST_HEAD_TIMEOUT);
            return Ok(());
        }
    };

    if peeked.is_ok_and(|head| head.is_websocket_upgrade()) {
        return handle_websocket(stream, peer_addr, relay).await;
    }

    serve_page(stream, peer_addr, assets).await
}

/// Read a plain request off the socket and answer it
async fn serve_page(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    assets: Arc<AssetResponder>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let head = match read_request_head(&mut stream).await {
        Ok(head) => head,
        Err(HttpError::HeadTooLarge { max }) => {
            debug!("Request head from {} exceeds {} bytes", peer_addr, max);
            Response::head_too_large().write_to(&mut stream).await?;
            return Ok(());
        }
        Err(HttpError::Malformed(reason)) => {
            debug!("Malformed request from {}: {}", peer_addr, reason);
            Response::bad_request().write_to(&mut stream).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let response = assets.respond(&head).await;
    response.write_to(&mut stream).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Complete the upgrade, admit, and pump frames into the relay until the
/// connection ends
async fn handle_websocket(
    stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut user_agent = None;
    let capture_agent = |request: &Request,
                         response: UpgradeResponse|
     -> Result<UpgradeResponse, ErrorResponse> {
        user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(response)
    };
    let ws_stream = accept_hdr_async(stream, capture_agent).await?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let link = Arc::new(WsLink::new(ws_sender));

    let client_id = match relay.admit(link.clone(), peer_addr, user_agent).await {
        Ok(id) => id,
        Err(e) if e.is_server_full() => {
            // Give the peer a bounded window to answer our close frame.
            let drained = timeout(CLOSE_DRAIN_TIMEOUT, async {
                while let Some(Ok(_)) = ws_receiver.next().await {}
            })
            .await;
            if drained.is_err() {
                debug!("Rejected client {} never answered the close frame", peer_addr);
            }
            link.advance(LinkState::Closed);
            return Ok(());
        }
        Err(e) => {
            link.advance(LinkState::Closed);
            return Err(e.into());
        }
    };

    let mut departure = Departure::Ended;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                relay.relay(&client_id, msg).await;
            }
            Ok(Message::Close(frame)) => {
                link.advance(LinkState::Closing);
                departure = Departure::from_close_frame(frame.as_ref());
            }
            // tungstenite queues the pong for pings on its own
            Ok(_) => continue,
            Err(e) => {
                departure = Departure::Error(e.to_string());
                break;
            }
        }
    }

    link.advance(LinkState::Closed);
    relay.disconnect(&client_id, &departure);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let server = RelayServer::default();
        assert_eq!(server.participant_count(), 0);
        assert!(server.relay().participant_ids().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_gets_400() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::default();
        tokio::spawn(async move { server.serve_listener(listener).await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut response)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 400 Bad Request"));
    }
}
