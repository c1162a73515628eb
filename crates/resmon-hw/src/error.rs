//! Error types for the resmon hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when reading hardware sensors.
#[derive(Error, Debug)]
pub enum Error {
    /// A sensor id no longer refers to a sensor of the source.
    #[error("Sensor {0} is no longer exposed by the source")]
    SensorGone(crate::SensorId),

    /// Failed to read a kernel interface file.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Kernel interface file had unexpected contents.
    #[error("Malformed {path}: {reason}")]
    Parse { path: String, reason: String },

    /// The source was closed and can no longer be refreshed.
    #[error("Sensor source is closed")]
    Closed,
}
