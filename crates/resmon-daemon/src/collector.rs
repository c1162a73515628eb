//! Periodic collection loop.
//!
//! Resolves sensors once, then on every tick refreshes the source, builds a
//! snapshot and hands it to the sinks. A failed tick is logged and skipped;
//! only cancellation ends the loop.

use std::time::Duration;

use resmon_client::TelemetrySnapshot;
use resmon_hw::SensorSource;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::sensors::{build_snapshot, CollectError, ResolvedSensors, SensorCatalog};
use crate::sinks::{DispatchReport, SinkSet};

/// Lifecycle of the collection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Dispatched(DispatchReport),
    Skipped,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub ticks: u64,
    pub skipped: u64,
}

pub struct Collector<S> {
    catalog: SensorCatalog<S>,
    sinks: SinkSet,
    interval: Duration,
    state: watch::Sender<CollectorState>,
}

impl<S: SensorSource> Collector<S> {
    pub fn new(source: S, sinks: SinkSet, interval: Duration) -> Self {
        let (state, _) = watch::channel(CollectorState::Idle);
        Self {
            catalog: SensorCatalog::new(source),
            sinks,
            interval,
            state,
        }
    }

    #[cfg(test)]
    pub fn watch_state(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    /// Runs until `cancel` fires, then closes the source.
    ///
    /// The first tick happens immediately. Ticks that fall behind are skipped
    /// rather than bunched up.
    pub async fn run(mut self, cancel: CancellationToken) -> CollectorStats {
        self.state.send_replace(CollectorState::Running);
        info!(
            "Collecting every {:?} into {} sinks: {}",
            self.interval,
            self.sinks.len(),
            self.sinks.names().join(", ")
        );

        let resolved = match self.catalog.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Sensor resolution failed, all metrics will read 0: {}", e);
                ResolvedSensors::default()
            }
        };

        let mut stats = CollectorStats::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            stats.ticks += 1;
            if self.tick(&resolved).await == TickOutcome::Skipped {
                stats.skipped += 1;
            }
        }

        self.state.send_replace(CollectorState::Stopping);
        self.catalog.close();
        self.state.send_replace(CollectorState::Stopped);
        info!(
            "Collector stopped after {} ticks ({} skipped)",
            stats.ticks, stats.skipped
        );
        stats
    }

    async fn tick(&mut self, resolved: &ResolvedSensors) -> TickOutcome {
        let snapshot = match self.collect(resolved) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to collect telemetry: {}", e);
                return TickOutcome::Skipped;
            }
        };

        let report = self.sinks.dispatch(&snapshot).await;
        if report.failed > 0 {
            warn!("{} of {} sinks failed", report.failed, self.sinks.len());
        } else {
            debug!("Snapshot delivered to {} sinks", report.delivered);
        }
        TickOutcome::Dispatched(report)
    }

    fn collect(&mut self, resolved: &ResolvedSensors) -> Result<TelemetrySnapshot, CollectError> {
        self.catalog.refresh()?;
        build_snapshot(self.catalog.source(), resolved)
    }
}
