//! Push session
//!
//! Per-connection protocol state: open, subscribed to zero or more topics,
//! closed. Inbound control frames drive the registry; every frame gets a
//! reply on the connection's own outbound queue. Protocol errors are
//! answered with an `error` frame and never close the session.
//!
//! Teardown runs `unsubscribe_all` exactly once, either through
//! [`Session::close`] or, if the session is dropped without being closed,
//! from `Drop`.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use types::errors::ProtocolError;
use types::ids::ConnectionId;

use crate::backpressure::{Outbound, OutboundFrame};
use crate::metrics::ServiceMetrics;
use crate::protocol::{parse_client_message, ClientRequest, ServerMessage};
use crate::registry::SubscriptionRegistry;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    IdleTimeout,
    TransportError,
    /// Outbound queue overflowed under the disconnect policy.
    Backpressure,
    ServerShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::TransportError => "transport_error",
            CloseReason::Backpressure => "backpressure",
            CloseReason::ServerShutdown => "server_shutdown",
        };
        f.write_str(s)
    }
}

pub struct Session {
    outbound: Outbound,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<ServiceMetrics>,
    closed: bool,
}

impl Session {
    /// Register the connection and start a session for it.
    pub fn open(
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<ServiceMetrics>,
        outbound: Outbound,
    ) -> Self {
        registry.register(outbound.handle());
        metrics.record_connection_opened();
        info!(connection = %outbound.id(), "Push session opened");
        Self {
            outbound,
            registry,
            metrics,
            closed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.outbound.id()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Handle one inbound text frame and queue the reply. Returns the
    /// request that was applied, or the error that was reported back.
    pub fn handle_text(&self, text: &str) -> Result<ClientRequest, ProtocolError> {
        let result = parse_client_message(text).and_then(|request| {
            self.apply(&request)?;
            Ok(request)
        });

        if let Err(e) = &result {
            self.metrics.record_protocol_error();
            debug!(connection = %self.id(), code = e.code(), error = %e, "Rejected client message");
            self.reply(&ServerMessage::error(e));
        }
        result
    }

    fn apply(&self, request: &ClientRequest) -> Result<(), ProtocolError> {
        match request {
            ClientRequest::Ping => {
                self.reply(&ServerMessage::pong());
            }
            ClientRequest::Subscribe(topic) => {
                self.registry.subscribe(self.id(), topic.clone())?;
                self.reply(&ServerMessage::subscribed(topic));
                info!(connection = %self.id(), topic = %topic, "Subscribed");
            }
            ClientRequest::Unsubscribe(topic) => {
                self.registry.unsubscribe(self.id(), topic);
                self.reply(&ServerMessage::unsubscribed(topic));
                info!(connection = %self.id(), topic = %topic, "Unsubscribed");
            }
        }
        Ok(())
    }

    fn reply(&self, message: &ServerMessage<'_>) {
        let frame = match message.encode() {
            Ok(json) => OutboundFrame::from(json),
            Err(e) => {
                warn!(connection = %self.id(), error = %e, "Failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.outbound.send(frame) {
            warn!(connection = %self.id(), error = %e, "Failed to queue reply");
        }
    }

    /// Tear the session down. Returns the number of topics it was removed
    /// from. Dropping the session afterwards releases the outbound queue,
    /// which ends the socket writer.
    pub fn close(mut self, reason: CloseReason) -> usize {
        let removed = self.teardown();
        if reason == CloseReason::IdleTimeout {
            self.metrics.record_idle_timeout();
        }
        if reason == CloseReason::Backpressure {
            self.metrics.record_slow_disconnect();
        }
        info!(connection = %self.id(), %reason, topics = removed, "Push session closed");
        removed
    }

    fn teardown(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        self.outbound.request_close();
        self.metrics.record_connection_closed();
        self.registry.unsubscribe_all(self.id())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            let removed = self.teardown();
            debug!(connection = %self.id(), topics = removed, "Push session dropped without close");
        }
    }
}
