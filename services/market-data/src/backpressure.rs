//! Per-connection outbound queues
//!
//! Each session owns a bounded mpsc queue drained by its socket writer.
//! The session keeps the only strong sender ([`Outbound`]); everything else
//! (the registry, the dispatcher) holds a [`ConnectionHandle`] wrapping a
//! weak sender, so a handle never keeps a connection alive.
//!
//! Enqueueing never waits. When a queue is full the connection's
//! [`DropPolicy`] decides: drop the frame, or flag the connection for
//! teardown. The flag is observed by the session loop through
//! [`Outbound::closing`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use types::errors::EnqueueError;
use types::ids::ConnectionId;

/// Drop policy when a connection's outbound queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Disconnect the lagging connection.
    Disconnect,
    /// Discard the frame that did not fit; the connection stays open.
    DropNewest,
}

impl FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disconnect" => Ok(DropPolicy::Disconnect),
            "drop_newest" | "drop-newest" => Ok(DropPolicy::DropNewest),
            other => Err(format!("unknown drop policy: {other}")),
        }
    }
}

/// A serialized frame, shared by every recipient of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(Arc<str>);

impl OutboundFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OutboundFrame {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State shared between a session and every handle to it.
#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    capacity: usize,
    policy: DropPolicy,
    closing: AtomicBool,
    close_signal: Notify,
    dropped: AtomicU64,
}

impl Shared {
    fn request_close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_one();
        }
    }

    fn try_send(
        &self,
        sender: &mpsc::Sender<OutboundFrame>,
        frame: OutboundFrame,
    ) -> Result<(), EnqueueError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }
        match sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    DropPolicy::DropNewest => {
                        debug!(connection = %self.id, "Outbound queue full, frame dropped");
                    }
                    DropPolicy::Disconnect => {
                        warn!(
                            connection = %self.id,
                            capacity = self.capacity,
                            "Outbound queue full, disconnecting slow connection"
                        );
                        self.request_close();
                    }
                }
                Err(EnqueueError::Full {
                    capacity: self.capacity,
                })
            }
        }
    }
}

/// Non-owning reference to a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    sender: mpsc::WeakSender<OutboundFrame>,
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Queue a frame without waiting.
    pub fn enqueue(&self, frame: OutboundFrame) -> Result<(), EnqueueError> {
        let Some(sender) = self.sender.upgrade() else {
            return Err(EnqueueError::Closed);
        };
        self.shared.try_send(&sender, frame)
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire)
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.shared.policy
    }
}

/// The owning side of a connection's outbound queue.
#[derive(Debug)]
pub struct Outbound {
    sender: mpsc::Sender<OutboundFrame>,
    shared: Arc<Shared>,
}

impl Outbound {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            sender: self.sender.downgrade(),
            shared: self.shared.clone(),
        }
    }

    /// Queue a control reply for this connection.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), EnqueueError> {
        self.shared.try_send(&self.sender, frame)
    }

    /// Flag the connection for teardown.
    pub fn request_close(&self) {
        self.shared.request_close();
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire)
    }

    /// Resolves once the connection has been flagged for teardown.
    pub async fn closing(&self) {
        loop {
            let notified = self.shared.close_signal.notified();
            if self.is_closing() {
                return;
            }
            notified.await;
        }
    }
}

/// Create the queue for a new connection. The receiver goes to the socket
/// writer; it yields `None` once the [`Outbound`] is dropped and drained.
pub fn outbound_channel(
    id: ConnectionId,
    capacity: usize,
    policy: DropPolicy,
) -> (Outbound, mpsc::Receiver<OutboundFrame>) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        id,
        capacity,
        policy,
        closing: AtomicBool::new(false),
        close_signal: Notify::new(),
        dropped: AtomicU64::new(0),
    });
    (Outbound { sender, shared }, receiver)
}
