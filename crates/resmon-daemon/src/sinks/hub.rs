//! Broadcast hub feeding connected WebSocket subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use resmon_client::message::encode;
use resmon_client::{ServerMessage, TelemetrySnapshot};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Sink, SinkError};

/// Fans encoded `Receive` frames out to every connected subscriber.
///
/// Each snapshot is encoded once. A subscriber that falls more than the queue
/// length behind misses the oldest frames instead of slowing the others.
pub struct BroadcastHub {
    tx: broadcast::Sender<Arc<str>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new(queue: usize) -> Self {
        let (tx, _) = broadcast::channel(queue.max(1));
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber.
    pub fn connect(&self) -> Connection {
        Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of subscribers currently connected.
    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Sends one snapshot to all subscribers, returning how many were queued.
    pub fn broadcast(&self, snapshot: &TelemetrySnapshot) -> Result<usize, SinkError> {
        let frame: Arc<str> = encode(&ServerMessage::Receive(*snapshot))?.into();
        // An error only means nobody is connected.
        Ok(self.tx.send(frame).unwrap_or(0))
    }
}

/// One subscriber's view of the hub.
pub struct Connection {
    pub id: u64,
    rx: broadcast::Receiver<Arc<str>>,
}

impl Connection {
    /// Waits for the next frame. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {} lagged, skipped {} frames", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Hub closed for subscriber {}", self.id);
                    return None;
                }
            }
        }
    }
}

/// Sink pushing each snapshot to hub subscribers.
pub struct HubSink {
    hub: Arc<BroadcastHub>,
}

impl HubSink {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }
}

impl Sink for HubSink {
    fn name(&self) -> &str {
        "hub"
    }

    fn consume<'a>(
        &'a self,
        snapshot: &'a TelemetrySnapshot,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        let result = self.hub.broadcast(snapshot).map(|sent| {
            debug!("Pushed snapshot to {} subscribers", sent);
        });
        async move { result }.boxed()
    }
}
