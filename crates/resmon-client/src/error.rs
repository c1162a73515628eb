//! Error types for the resmon client library.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to the daemon's push endpoint.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connecting to the endpoint failed.
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The WebSocket transport failed after connecting.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error("Invalid message: {0}")]
    Message(#[from] serde_json::Error),
}
