//! WebSocket gateway transport.
//!
//! Accepts client sockets, wires each one to a [`Session`], and pumps
//! frames. Each connection gets a bounded outbound queue drained by its own
//! writer task, so one stalled client backs up only its own queue and
//! never a broadcast to others.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::cache::EventCacheService;
use crate::config::{AuthConfig, GatewayConfig};
use crate::domain::ConnectionId;
use crate::engine::RecommendationEngine;
use crate::error::Result;
use crate::gateway::Session;
use crate::port::{ClientTransport, DeliveryResult, TokenVerifier};
use crate::registry::ConnectionRegistry;

/// Outbound queue depth per connection before sends start failing.
const OUTBOUND_BUFFER: usize = 64;

/// Transport handle for one websocket connection.
///
/// Sends enqueue onto the connection's writer task. A full queue fails the
/// delivery immediately instead of blocking the broadcaster.
pub struct WsTransport {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl ClientTransport for WsTransport {
    async fn send(&self, message: String) -> DeliveryResult {
        match self.tx.try_send(Message::Text(message)) {
            Ok(()) => DeliveryResult::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                DeliveryResult::Failed("outbound queue full".into())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                DeliveryResult::Failed("connection closed".into())
            }
        }
    }

    async fn close(&self) {
        let _ = self.tx.send(Message::Close(None)).await;
    }
}

/// Dependencies shared by every connection the server accepts.
pub struct GatewayDeps {
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub engine: Arc<RecommendationEngine>,
    pub cache: Arc<EventCacheService>,
    pub gateway_config: GatewayConfig,
    pub auth_config: AuthConfig,
}

/// WebSocket accept loop.
pub struct WsServer {
    deps: Arc<GatewayDeps>,
}

impl WsServer {
    #[must_use]
    pub fn new(deps: GatewayDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    /// Bind and accept until the listener errors or the task is aborted.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.deps.gateway_config.bind_addr).await?;
        info!(addr = %self.deps.gateway_config.bind_addr, "Gateway listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            let deps = Arc::clone(&self.deps);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, deps).await {
                    debug!(peer = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }
}

/// Run one connection from handshake to disconnect.
async fn handle_connection(stream: TcpStream, deps: Arc<GatewayDeps>) -> Result<()> {
    // Capture an inline token from the connect request's query string.
    let mut inline_token: Option<String> = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
        inline_token = request.uri().query().and_then(inline_token_from_query);
        Ok(response)
    })
    .await?;

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Writer task: sole owner of the sink.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let connection_id = ConnectionId::generate();
    let transport: Arc<dyn ClientTransport> = Arc::new(WsTransport { tx: tx.clone() });
    let session = Session::new(
        connection_id.clone(),
        transport,
        Arc::clone(&deps.registry),
        Arc::clone(&deps.verifier),
        Arc::clone(&deps.engine),
        Arc::clone(&deps.cache),
        &deps.gateway_config,
        deps.auth_config.clone(),
    );
    session.register();

    if let Some(token) = inline_token {
        session.authenticate(&token).await;
    }

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Ping(payload)) => {
                let _ = tx.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                debug!(connection_id = %connection_id, frame = ?frame, "Client closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Socket error");
                break;
            }
        }
    }

    session.disconnect().await;
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// `token` value from the connect request's query string, percent-decoded.
fn inline_token_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "token")
        .map(|(_, value)| value.into_owned())
}
