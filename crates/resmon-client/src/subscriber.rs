//! Reconnecting subscriber for the daemon's push channel.
//!
//! The subscriber runs on its own task. It keeps connecting until disposed,
//! waiting between attempts as dictated by its [`RetryPolicy`], and hands
//! every received snapshot to a single observer callback in arrival order.
//! The callback runs on the subscriber task; observers that need a specific
//! thread forward the snapshot themselves (e.g. through a channel). A panic
//! in the callback is logged and the snapshot dropped; the session goes on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::message::{self, ServerMessage};
use crate::policy::{FixedInterval, RetryPolicy};
use crate::transport::{Connector, Session, WsConnector};
use crate::TelemetrySnapshot;

/// Connection lifecycle as seen by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying; terminal once disposed.
    Disconnected,
    /// Trying to establish the first connection.
    Connecting,
    Connected,
    /// Trying to re-establish a lost connection.
    Reconnecting,
}

/// Builder for a subscriber task.
pub struct Subscriber<C> {
    connector: C,
    policy: Arc<dyn RetryPolicy>,
}

impl Subscriber<WsConnector> {
    /// Subscribes to a WebSocket URL, retrying every 5 seconds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<F>(url: impl Into<String>, observer: F) -> SubscriberHandle
    where
        F: FnMut(TelemetrySnapshot) + Send + 'static,
    {
        Subscriber::new(WsConnector::new(url)).spawn(observer)
    }
}

impl<C: Connector> Subscriber<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            policy: Arc::new(FixedInterval::default()),
        }
    }

    pub fn with_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Starts the connect loop and returns its handle.
    pub fn spawn<F>(self, observer: F) -> SubscriberHandle
    where
        F: FnMut(TelemetrySnapshot) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(run(
            self.connector,
            self.policy,
            observer,
            cancel.clone(),
            state_tx,
        ));

        SubscriberHandle {
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Handle to a running subscriber. Dropping it stops the subscriber.
pub struct SubscriberHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl SubscriberHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stops retrying, closes an open connection and waits for the task to end.
    pub async fn dispose(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Subscriber task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How a connected session ended.
enum SessionEnd {
    Cancelled,
    Lost,
}

async fn run<C, F>(
    connector: C,
    policy: Arc<dyn RetryPolicy>,
    mut observer: F,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
) where
    C: Connector,
    F: FnMut(TelemetrySnapshot) + Send + 'static,
{
    let endpoint = connector.endpoint().to_string();
    let mut attempt: u32 = 0;
    let mut was_connected = false;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connector.connect() => result,
        };

        match result {
            Ok(mut session) => {
                attempt = 0;
                was_connected = true;
                state.send_replace(ConnectionState::Connected);
                info!("Connected to {}", endpoint);

                match pump(session.as_mut(), &mut observer, &cancel).await {
                    SessionEnd::Cancelled => {
                        session.close().await;
                        break;
                    }
                    SessionEnd::Lost => {
                        warn!("Connection to {} lost", endpoint);
                        state.send_replace(ConnectionState::Reconnecting);
                    }
                }
            }
            Err(e) => warn!("Connection attempt to {} failed: {}", endpoint, e),
        }

        attempt = attempt.saturating_add(1);
        let Some(delay) = policy.next_delay(attempt) else {
            info!("Giving up on {} after {} attempts", endpoint, attempt);
            break;
        };
        debug!("Retrying {} in {:?} (attempt {})", endpoint, delay, attempt);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        state.send_replace(if was_connected {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });
    }

    state.send_replace(ConnectionState::Disconnected);
    debug!("Subscriber for {} stopped", endpoint);
}

/// Forwards frames from one session until it ends or the subscriber is cancelled.
async fn pump<F>(
    session: &mut dyn Session,
    observer: &mut F,
    cancel: &CancellationToken,
) -> SessionEnd
where
    F: FnMut(TelemetrySnapshot),
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            frame = session.next_frame() => frame,
        };

        match frame {
            None => return SessionEnd::Lost,
            Some(Err(e)) => {
                warn!("Receive error: {}", e);
                return SessionEnd::Lost;
            }
            Some(Ok(text)) => match message::decode(&text) {
                Ok(ServerMessage::Receive(snapshot)) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| observer(snapshot))).is_err() {
                        error!("Observer panicked, dropping snapshot");
                    }
                }
                Err(e) => warn!("Ignoring malformed frame: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientError, Result};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Server side of one fake session: send frames, drop to disconnect.
    type ServerEnd = mpsc::UnboundedSender<String>;

    struct FakeConnector {
        fail_first: u32,
        attempts: Arc<AtomicU32>,
        closed: Arc<AtomicBool>,
        accepted: mpsc::UnboundedSender<ServerEnd>,
    }

    struct FakeSession {
        frames: mpsc::UnboundedReceiver<String>,
        closed: Arc<AtomicBool>,
    }

    impl Session for FakeSession {
        fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<String>>> {
            async move { self.frames.recv().await.map(Ok) }.boxed()
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            self.closed.store(true, Ordering::SeqCst);
            async {}.boxed()
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Session>>> {
            async move {
                let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= self.fail_first {
                    return Err(ClientError::Connect {
                        url: "fake".to_string(),
                        reason: "connection refused".to_string(),
                    });
                }
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = self.accepted.send(tx);
                Ok(Box::new(FakeSession {
                    frames: rx,
                    closed: self.closed.clone(),
                }) as Box<dyn Session>)
            }
            .boxed()
        }

        fn endpoint(&self) -> &str {
            "fake"
        }
    }

    struct Harness {
        attempts: Arc<AtomicU32>,
        closed: Arc<AtomicBool>,
        accepted: mpsc::UnboundedReceiver<ServerEnd>,
        received: mpsc::UnboundedReceiver<TelemetrySnapshot>,
        handle: SubscriberHandle,
    }

    fn start(fail_first: u32, policy: impl RetryPolicy + 'static) -> Harness {
        start_with(fail_first, policy, |_| false)
    }

    /// Like [`start`], but the observer panics on snapshots matching `explode`.
    fn start_with(
        fail_first: u32,
        policy: impl RetryPolicy + 'static,
        explode: fn(&TelemetrySnapshot) -> bool,
    ) -> Harness {
        let attempts = Arc::new(AtomicU32::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let (accepted_tx, accepted) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();
        let connector = FakeConnector {
            fail_first,
            attempts: attempts.clone(),
            closed: closed.clone(),
            accepted: accepted_tx,
        };
        let handle = Subscriber::new(connector)
            .with_policy(policy)
            .spawn(move |snapshot| {
                if explode(&snapshot) {
                    panic!("observer exploded");
                }
                let _ = received_tx.send(snapshot);
            });
        Harness {
            attempts,
            closed,
            accepted,
            received,
            handle,
        }
    }

    fn frame(cpu: f32) -> String {
        message::encode(&ServerMessage::Receive(TelemetrySnapshot {
            cpu_load_total: cpu,
            ..Default::default()
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_on_third_attempt() {
        let mut h = start(2, FixedInterval(Duration::from_secs(5)));
        let started = Instant::now();

        let server = h.accepted.recv().await.unwrap();
        assert_eq!(h.attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(h.received.try_recv().is_err());

        for cpu in [1.0, 2.0, 3.0] {
            server.send(frame(cpu)).unwrap();
        }
        for cpu in [1.0, 2.0, 3.0] {
            assert_eq!(h.received.recv().await.unwrap().cpu_load_total, cpu);
        }
        assert_eq!(h.handle.state(), ConnectionState::Connected);

        let state = h.handle.watch_state();
        h.handle.dispose().await;
        assert!(h.closed.load(Ordering::SeqCst));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dispose_interrupts_retry_wait() {
        let h = start(u32::MAX, FixedInterval(Duration::from_secs(5)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(h.handle.state(), ConnectionState::Connecting);

        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(1), h.handle.dispose())
            .await
            .expect("dispose waited out the retry interval");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_server_disconnect() {
        let mut h = start(0, FixedInterval(Duration::from_secs(5)));
        let mut state = h.handle.watch_state();

        let first = h.accepted.recv().await.unwrap();
        first.send(frame(1.0)).unwrap();
        assert_eq!(h.received.recv().await.unwrap().cpu_load_total, 1.0);
        drop(first);

        state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();

        let lost_at = Instant::now();
        let second = h.accepted.recv().await.unwrap();
        assert!(lost_at.elapsed() >= Duration::from_secs(5));
        assert_eq!(h.attempts.load(Ordering::SeqCst), 2);

        second.send(frame(2.0)).unwrap();
        assert_eq!(h.received.recv().await.unwrap().cpu_load_total, 2.0);
        assert!(!h.closed.load(Ordering::SeqCst));
        h.handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_skipped() {
        let mut h = start(0, FixedInterval::default());
        let server = h.accepted.recv().await.unwrap();

        server.send("{\"type\":\"Bogus\"}".to_string()).unwrap();
        server.send(frame(9.0)).unwrap();
        assert_eq!(h.received.recv().await.unwrap().cpu_load_total, 9.0);
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);
        h.handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_panic_keeps_session() {
        let mut h = start_with(0, FixedInterval::default(), |s| s.cpu_load_total < 0.0);
        let server = h.accepted.recv().await.unwrap();

        server.send(frame(-1.0)).unwrap();
        server.send(frame(4.0)).unwrap();
        assert_eq!(h.received.recv().await.unwrap().cpu_load_total, 4.0);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
        assert_eq!(h.attempts.load(Ordering::SeqCst), 1);

        h.handle.dispose().await;
        assert!(h.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_exhaustion_disconnects() {
        let h = start(u32::MAX, |attempt: u32| {
            (attempt < 3).then(|| Duration::from_millis(100))
        });
        let mut state = h.handle.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(h.attempts.load(Ordering::SeqCst), 3);
        h.handle.dispose().await;
    }
}
