//! Transport seam between the subscriber state machine and the network.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{ClientError, Result};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// An open connection yielding text frames.
pub trait Session: Send {
    /// Next text frame; `None` once the peer has closed the connection.
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>>;

    /// Closes the connection gracefully.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Opens sessions to one endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Session>>>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

/// Connects to the daemon's WebSocket endpoint (e.g. `ws://127.0.0.1:9980/monitor`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Session>>> {
        async move {
            debug!("Connecting to {}", self.url);
            let (stream, _response) =
                connect_async(self.url.as_str())
                    .await
                    .map_err(|e| ClientError::Connect {
                        url: self.url.clone(),
                        reason: e.to_string(),
                    })?;
            Ok(Box::new(WsSession { stream }) as Box<dyn Session>)
        }
        .boxed()
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Session for WsSession {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
        async move {
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text)),
                    Ok(Message::Close(frame)) => {
                        debug!("Server closed the connection: {:?}", frame);
                        return None;
                    }
                    // Pings are answered by tungstenite itself.
                    Ok(_) => continue,
                    Err(e) => return Some(Err(e.into())),
                }
            }
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            if let Err(e) = self.stream.close(None).await {
                debug!("Error while closing WebSocket: {}", e);
            }
            // Drain until the server acknowledges the close.
            let drain = async { while let Some(Ok(_)) = self.stream.next().await {} };
            if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
                debug!("Server did not acknowledge close within {:?}", CLOSE_TIMEOUT);
            }
        }
        .boxed()
    }
}
