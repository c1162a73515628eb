//! Sensor resolution and snapshot assembly.
//!
//! The catalog binds each metric to a concrete sensor once at startup; the
//! sample builder re-reads those bindings on every tick.

mod catalog;
mod sample;

pub use catalog::{Binding, ResolvedSensors, SensorCatalog};
pub use sample::build_snapshot;

use thiserror::Error;

/// Failure while collecting one snapshot.
#[derive(Error, Debug)]
pub enum CollectError {
    /// The sensor source failed to refresh or read.
    #[error("sensor source error: {0}")]
    Source(#[from] resmon_hw::Error),
}
