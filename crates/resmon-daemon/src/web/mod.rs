//! HTTP and WebSocket endpoints.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Creates the web router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Liveness
        .route("/", get(index))
        // Push channel
        .route("/monitor", get(monitor))
        // Buffered data
        .route("/history", get(history))
        .route("/latest", get(latest))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router until the shutdown token is cancelled.
///
/// Cancellation stops accepting connections and lets in-flight requests
/// finish; subscribers see the token themselves and send a close frame.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// GET / - Liveness text
async fn index() -> &'static str {
    "Resource monitor"
}

/// GET /monitor - WebSocket upgrade for snapshot push
async fn monitor(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state))
}

/// Forwards hub frames to one WebSocket until either side goes away.
async fn serve_subscriber(socket: WebSocket, state: Arc<AppState>) {
    let mut connection = state.hub.connect();
    let id = connection.id;
    info!(
        "Subscriber {} connected ({} connected)",
        id,
        state.hub.connection_count()
    );

    let send_timeout = state.config.send_timeout();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let close = sender.send(Message::Close(None));
                if tokio::time::timeout(send_timeout, close).await.is_err() {
                    debug!("Subscriber {} did not take the close frame", id);
                }
                break;
            }
            frame = connection.next() => {
                let Some(frame) = frame else { break };
                match tokio::time::timeout(send_timeout, sender.send(Message::Text(frame.to_string()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Subscriber {} send failed: {}", id, e);
                        break;
                    }
                    Err(_) => {
                        warn!("Subscriber {} did not accept a frame within {:?}, dropping", id, send_timeout);
                        break;
                    }
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Clients have nothing to say on this channel.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Subscriber {} receive failed: {}", id, e);
                    break;
                }
            },
        }
    }

    drop(connection);
    info!(
        "Subscriber {} disconnected ({} connected)",
        id,
        state.hub.connection_count()
    );
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    capacity: usize,
    series: BTreeMap<&'static str, Vec<f32>>,
}

/// GET /history - Buffered series per metric, oldest first
async fn history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let history = state.history();
    let series = history
        .iter()
        .map(|(metric, values)| (metric.key(), values.iter().collect()))
        .collect();
    Json(HistoryResponse {
        capacity: history.capacity(),
        series,
    })
}

/// GET /latest - Most recent snapshot
async fn latest(State(state): State<Arc<AppState>>) -> Response {
    match state.latest() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use resmon_client::{ConnectionState, Metric, Subscriber, TelemetrySnapshot};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    async fn start(state: Arc<AppState>) -> (SocketAddr, JoinHandle<std::io::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (addr, tokio::spawn(serve(listener, state)))
    }

    async fn wait_for_connections(state: &AppState, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.hub.connection_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }

    #[tokio::test]
    async fn test_index_is_plain_text() {
        let state = Arc::new(AppState::new(Config::default()));
        let (addr, _server) = start(state).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("Resource monitor"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_pushed_snapshots() {
        let state = Arc::new(AppState::new(Config::default()));
        let (addr, _server) = start(state.clone()).await;
        let url = format!("ws://{}/monitor", addr);

        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let a = Subscriber::connect(url.clone(), move |s| {
            let _ = tx_a.send(s);
        });
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        let b = Subscriber::connect(url, move |s| {
            let _ = tx_b.send(s);
        });
        wait_for_connections(&state, 2).await;
        a.watch_state()
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        let snapshot = TelemetrySnapshot {
            cpu_load_total: 12.5,
            gpu_memory_load: 25.0,
            ..Default::default()
        };
        assert_eq!(state.hub.broadcast(&snapshot).unwrap(), 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, snapshot);
        }

        // One subscriber leaving does not disturb the other.
        a.dispose().await;
        wait_for_connections(&state, 1).await;
        state.hub.broadcast(&snapshot).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, snapshot);

        b.dispose().await;
        wait_for_connections(&state, 0).await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let state = Arc::new(AppState::new(Config::default()));
        let (addr, server) = start(state.clone()).await;

        let handle = Subscriber::connect(format!("ws://{}/monitor", addr), |_| {});
        wait_for_connections(&state, 1).await;

        state.shutdown.cancel();
        wait_for_connections(&state, 0).await;

        // The server drains and returns instead of being dropped mid-flight.
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop after shutdown")
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
        handle.dispose().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_silent_subscriber() {
        let mut config = Config::default();
        config.web.send_timeout = 200;
        let state = Arc::new(AppState::new(config));
        let (addr, server) = start(state.clone()).await;

        // Upgrades and then never reads a byte.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /monitor HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\n\
                  Upgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 512];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed before upgrading");
            head.extend_from_slice(&buf[..n]);
        }
        assert!(head.starts_with(b"HTTP/1.1 101"));
        wait_for_connections(&state, 1).await;

        state.shutdown.cancel();
        wait_for_connections(&state, 0).await;
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop after shutdown")
            .unwrap()
            .unwrap();
        drop(stream);
    }

    #[tokio::test]
    async fn test_history_and_latest() {
        let state = Arc::new(AppState::new(Config::default()));
        assert_eq!(
            latest(State(state.clone())).await.status(),
            StatusCode::NO_CONTENT
        );

        let snapshot = TelemetrySnapshot {
            memory_load_physical: 61.0,
            ..Default::default()
        };
        state.bus.publish(&snapshot);

        let Json(body) = history(State(state.clone())).await;
        assert_eq!(body.capacity, 101);
        assert_eq!(body.series.len(), Metric::ALL.len());
        let memory = &body.series[Metric::MemoryLoadPhysical.key()];
        assert_eq!(memory.len(), 101);
        assert_eq!(memory[100], 61.0);
        assert_eq!(memory[0], 0.0);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["capacity"], 101);
        assert_eq!(json["series"]["memoryLoadPhysical"][100], 61.0);

        assert_eq!(latest(State(state)).await.status(), StatusCode::OK);
    }
}
