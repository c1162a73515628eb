//! Application state shared by the collector and the web server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use resmon_client::{MetricHistory, TelemetrySnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::sinks::{BroadcastHub, EventBus, EventBusSink, HubSink, LogSink, SinkSet, Subscription};

#[derive(Default)]
struct Recorded {
    history: MetricHistory,
    latest: Option<TelemetrySnapshot>,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub bus: EventBus,
    pub hub: Arc<BroadcastHub>,
    /// Cancelled when the daemon shuts down.
    pub shutdown: CancellationToken,
    recorded: Arc<Mutex<Recorded>>,
    _recorder: Subscription,
}

impl AppState {
    /// Creates the state and starts recording history from the event bus.
    pub fn new(config: Config) -> Self {
        let bus = EventBus::new();
        let hub = Arc::new(BroadcastHub::new(config.web.queue));
        let recorded = Arc::new(Mutex::new(Recorded {
            history: MetricHistory::new(config.history),
            latest: None,
        }));

        let sink = recorded.clone();
        let recorder = bus.subscribe(move |snapshot| {
            let mut recorded = lock(&sink);
            recorded.history.record(snapshot);
            recorded.latest = Some(*snapshot);
        });

        Self {
            config,
            bus,
            hub,
            shutdown: CancellationToken::new(),
            recorded,
            _recorder: recorder,
        }
    }

    /// Builds the configured sinks in their fixed order: event bus, hub, log.
    pub fn build_sinks(&self) -> SinkSet {
        let mut sinks = SinkSet::new();
        if self.config.sinks.event_bus {
            debug!(
                "Event bus sink feeds {} observers",
                self.bus.subscriber_count()
            );
            sinks.push(EventBusSink::new(self.bus.clone()));
        }
        if self.config.sinks.hub {
            sinks.push(HubSink::new(self.hub.clone()));
        }
        if self.config.sinks.log {
            sinks.push(LogSink);
        }
        if sinks.is_empty() {
            info!("No sinks enabled, snapshots will be collected and dropped");
        }
        sinks
    }

    /// Copy of the per-metric history.
    pub fn history(&self) -> MetricHistory {
        lock(&self.recorded).history.clone()
    }

    /// Most recent snapshot published on the event bus.
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        lock(&self.recorded).latest
    }
}

fn lock(recorded: &Mutex<Recorded>) -> MutexGuard<'_, Recorded> {
    recorded.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resmon_client::Metric;

    #[test]
    fn test_default_sinks() {
        let state = AppState::new(Config::default());
        assert_eq!(state.build_sinks().names(), vec!["event-bus", "hub"]);

        let mut config = Config::default();
        config.sinks.log = true;
        config.sinks.event_bus = false;
        let state = AppState::new(config);
        assert_eq!(state.build_sinks().names(), vec!["hub", "log"]);
    }

    #[test]
    fn test_bus_feeds_history() {
        let state = AppState::new(Config::default());
        assert!(state.latest().is_none());
        assert_eq!(state.history().series(Metric::CpuLoadTotal).last(), 0.0);

        let snapshot = TelemetrySnapshot {
            cpu_load_total: 55.0,
            ..Default::default()
        };
        state.bus.publish(&snapshot);

        assert_eq!(state.latest(), Some(snapshot));
        let history = state.history();
        assert_eq!(history.capacity(), 101);
        assert_eq!(history.series(Metric::CpuLoadTotal).last(), 55.0);
        assert_eq!(history.series(Metric::CpuLoadTotal).get(99), Some(0.0));
    }
}
