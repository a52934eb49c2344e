//! WebSocket transport driver
//!
//! Runs one push session over an upgraded axum socket. The socket is split:
//! a writer task drains the connection's outbound queue, and the read loop
//! feeds text frames to the [`Session`]. The session ends on peer close,
//! transport error, idle timeout, outbound overflow under the disconnect
//! policy, or server shutdown.
//!
//! Any inbound frame resets the idle timer, including WebSocket-level
//! ping/pong. Binary frames are ignored.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use types::ids::ConnectionId;

use crate::backpressure::outbound_channel;
use crate::config::WsConfig;
use crate::metrics::ServiceMetrics;
use crate::registry::SubscriptionRegistry;
use crate::session::{CloseReason, Session};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a socket needs to run a session.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<SubscriptionRegistry>,
    pub metrics: Arc<ServiceMetrics>,
    pub config: WsConfig,
    /// Flips to `true` when the server is shutting down. Dropping the
    /// sender also ends every session.
    pub shutdown: watch::Receiver<bool>,
}

/// Drive one connection until it ends.
pub async fn serve_socket(socket: WebSocket, ctx: SessionContext) {
    let id = ConnectionId::next();
    let (outbound, mut queue) =
        outbound_channel(id, ctx.config.queue_capacity, ctx.config.drop_policy);
    let session = Session::open(ctx.registry.clone(), ctx.metrics.clone(), outbound);
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.as_str().into())).await {
                debug!(connection = %id, error = %e, "Socket write failed");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut shutdown = ctx.shutdown.clone();
    let idle_timeout = ctx.config.idle_timeout;

    let reason = loop {
        if *shutdown.borrow() {
            break CloseReason::ServerShutdown;
        }

        tokio::select! {
            _ = session.outbound().closing() => break CloseReason::Backpressure,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break CloseReason::ServerShutdown;
                }
            }
            next = tokio::time::timeout(idle_timeout, stream.next()) => match next {
                Err(_) => {
                    info!(connection = %id, timeout_ms = idle_timeout.as_millis() as u64, "Idle timeout");
                    break CloseReason::IdleTimeout;
                }
                Ok(None) => break CloseReason::PeerClosed,
                Ok(Some(Err(e))) => {
                    warn!(connection = %id, error = %e, "WebSocket read error");
                    break CloseReason::TransportError;
                }
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => {
                        debug!(connection = %id, bytes = text.len(), "Received text frame");
                        let _ = session.handle_text(text.as_str());
                    }
                    Message::Binary(bytes) => {
                        warn!(connection = %id, bytes = bytes.len(), "Ignoring binary frame");
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break CloseReason::PeerClosed,
                },
            },
        }
    };

    session.close(reason);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        warn!(connection = %id, "Socket writer did not finish, aborting");
        writer.abort();
    }
}
