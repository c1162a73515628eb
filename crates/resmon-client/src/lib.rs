//! Client library for the resmon daemon's push channel.
//!
//! Provides the telemetry wire types shared with the daemon, the rolling
//! history used to buffer series for charting, and a subscriber that keeps
//! a connection to the daemon alive across restarts.

pub mod error;
pub mod history;
pub mod message;
pub mod policy;
pub mod snapshot;
pub mod subscriber;
pub mod transport;

pub use error::{ClientError, Result};
pub use history::{MetricHistory, RollingHistory, DEFAULT_CAPACITY};
pub use message::ServerMessage;
pub use policy::{ExponentialBackoff, FixedInterval, RetryPolicy, DEFAULT_RETRY_INTERVAL};
pub use snapshot::{Metric, TelemetrySnapshot};
pub use subscriber::{ConnectionState, Subscriber, SubscriberHandle};
pub use transport::{Connector, Session, WsConnector};

/// Default push endpoint of a local daemon.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:9980/monitor";
