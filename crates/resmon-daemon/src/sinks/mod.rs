//! Snapshot sinks and the fan-out that feeds them.
//!
//! Every sink receives every snapshot, in registration order. A failing or
//! panicking sink is logged and skipped; it never keeps later sinks from
//! running and never affects the next tick.

mod event_bus;
mod hub;
mod log;

pub use event_bus::{EventBus, EventBusSink, Subscription};
pub use hub::{BroadcastHub, HubSink};
pub use log::LogSink;

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use resmon_client::TelemetrySnapshot;
use thiserror::Error;
use tracing::{error, trace};

/// Failure reported by a sink for one snapshot.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The snapshot could not be encoded for the wire.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] resmon_client::ClientError),
}

/// Consumer of telemetry snapshots.
pub trait Sink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handles one snapshot.
    fn consume<'a>(
        &'a self,
        snapshot: &'a TelemetrySnapshot,
    ) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Result of handing one snapshot to every sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered, append-only collection of sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink after the ones already registered.
    pub fn push<S: Sink + 'static>(&mut self, sink: S) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Hands the snapshot to each sink in turn, isolating failures.
    pub async fn dispatch(&self, snapshot: &TelemetrySnapshot) -> DispatchReport {
        let mut report = DispatchReport::default();

        for sink in &self.sinks {
            // consume() may panic before handing back a future.
            let outcome = AssertUnwindSafe(async { sink.consume(snapshot).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    trace!("Sink {} consumed snapshot", sink.name());
                    report.delivered += 1;
                }
                Ok(Err(e)) => {
                    error!("Sink {} failed: {}", sink.name(), e);
                    report.failed += 1;
                }
                Err(_) => {
                    error!("Sink {} panicked", sink.name());
                    report.failed += 1;
                }
            }
        }

        report
    }
}
