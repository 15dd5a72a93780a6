// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated WebSocket connection supervisor.
//!
//! [`SocketSupervisor`] owns the single multiplexed socket: dialing through
//! the [`SocketDialer`] seam with the current credential, reconnecting with
//! the shared backoff policy, heartbeating, and forwarding every decoded
//! inbound frame to the currently installed [`FrameSink`]. The read task is
//! created once per connection lifetime; the sink slot is swappable at any
//! time without dropping frames.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stagelink_auth::{await_refresh, drain_refresh, RefreshCoordinator};
use stagelink_core::{
    Backoff, ConnectionStatus, FrameSink, InboundFrame, OutboundFrame, ReconnectPolicy,
    SocketDialer, SocketLink, StagelinkError,
};

/// Builder for [`SocketSupervisor`].
pub struct SocketSupervisorBuilder {
    url: String,
    dialer: Option<Arc<dyn SocketDialer>>,
    auth: Option<Arc<RefreshCoordinator>>,
    policy: ReconnectPolicy,
    heartbeat: Duration,
}

impl SocketSupervisorBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dialer: None,
            auth: None,
            policy: ReconnectPolicy::default(),
            heartbeat: Duration::from_secs(30),
        }
    }

    pub fn dialer(mut self, dialer: Arc<dyn SocketDialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn auth(mut self, auth: Arc<RefreshCoordinator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn build(self) -> Result<SocketSupervisor, StagelinkError> {
        if self.url.trim().is_empty() {
            return Err(StagelinkError::Config("socket url must not be empty".into()));
        }
        let dialer = self
            .dialer
            .ok_or_else(|| StagelinkError::Config("socket dialer is required".into()))?;
        let auth = self
            .auth
            .ok_or_else(|| StagelinkError::Config("auth coordinator is required".into()))?;

        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Ok(SocketSupervisor {
            inner: Arc::new(Inner {
                url: self.url,
                dialer,
                auth,
                policy: self.policy,
                heartbeat: self.heartbeat,
                sink: ArcSwapOption::empty(),
                status_tx,
                conn: Mutex::new(None),
            }),
        })
    }
}

/// Supervises the single authenticated socket connection.
pub struct SocketSupervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SocketSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSupervisor")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

struct Inner {
    url: String,
    dialer: Arc<dyn SocketDialer>,
    auth: Arc<RefreshCoordinator>,
    policy: ReconnectPolicy,
    heartbeat: Duration,
    sink: ArcSwapOption<Arc<dyn FrameSink>>,
    status_tx: watch::Sender<ConnectionStatus>,
    conn: Mutex<Option<Conn>>,
}

struct Conn {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

impl Inner {
    fn conn(&self) -> MutexGuard<'_, Option<Conn>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    fn deliver(&self, frame: InboundFrame) {
        match self.sink.load_full() {
            Some(sink) => sink.on_frame(frame),
            None => debug!(kind = %frame.kind, "no sink installed, frame dropped"),
        }
    }
}

impl SocketSupervisor {
    pub fn builder(url: impl Into<String>) -> SocketSupervisorBuilder {
        SocketSupervisorBuilder::new(url)
    }

    /// Open the connection if not already open. Idempotent.
    pub fn connect(&self) {
        let mut conn = self.inner.conn();
        if let Some(existing) = conn.as_ref() {
            if !existing.task.is_finished() {
                debug!(url = %self.inner.url, "already connected");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            cancel.clone(),
            outbound_rx,
        ));
        *conn = Some(Conn {
            cancel,
            task,
            outbound,
        });
    }

    /// Close the connection and halt reconnection until the next `connect()`.
    pub fn disconnect(&self) {
        let conn = self.inner.conn().take();
        if let Some(conn) = conn {
            conn.cancel.cancel();
            conn.task.abort();
            self.inner.set_status(ConnectionStatus::Disconnected);
            info!(url = %self.inner.url, "socket disconnected");
        }
    }

    /// Send an outbound frame over the live connection.
    ///
    /// Fails with a `Channel` error when the socket is not connected; callers
    /// decide whether to surface or retry, frames are never queued across
    /// connections.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), StagelinkError> {
        let conn = self.inner.conn();
        let connected = *self.inner.status_tx.borrow() == ConnectionStatus::Connected;
        match conn.as_ref() {
            Some(conn) if connected && !conn.task.is_finished() => conn
                .outbound
                .send(frame)
                .map_err(|_| StagelinkError::Channel {
                    message: "connection task gone".into(),
                    source: None,
                }),
            _ => Err(StagelinkError::Channel {
                message: "socket not connected".into(),
                source: None,
            }),
        }
    }

    /// Observe connection status transitions.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx_subscribe()
    }

    fn status_tx_subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Install the frame sink; replaces any previous sink immediately.
    ///
    /// Frames decoded after the swap reach the new sink; the underlying
    /// subscription is untouched, so no frames are dropped by the swap.
    pub fn set_sink(&self, sink: Arc<dyn FrameSink>) {
        self.inner.sink.store(Some(Arc::new(sink)));
    }

    /// Remove the sink; further frames are dropped with a diagnostic.
    pub fn clear_sink(&self) {
        self.inner.sink.store(None);
    }
}

impl Drop for SocketSupervisor {
    fn drop(&mut self) {
        self.disconnect();
    }
}

enum LinkEnd {
    Cancelled,
    Refresh,
    Closed,
    Failed,
}

async fn run_loop(
    inner: Arc<Inner>,
    cancel: CancellationToken,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    let mut refresh_rx = inner.auth.bus().subscribe();
    let mut backoff = Backoff::new(inner.policy);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        inner.set_status(ConnectionStatus::Connecting);
        match open_link(&inner).await {
            Ok(link) => {
                // The link was just dialed with current credentials; refresh
                // notifications that raced the dial are stale.
                drain_refresh(&mut refresh_rx);
                backoff.reset();
                inner.set_status(ConnectionStatus::Connected);
                info!(url = %inner.url, "socket connected");

                let end = drive_link(
                    &inner,
                    link,
                    &cancel,
                    &mut refresh_rx,
                    &mut outbound_rx,
                )
                .await;

                inner.set_status(ConnectionStatus::Disconnected);
                match end {
                    LinkEnd::Cancelled => break,
                    LinkEnd::Refresh => {
                        debug!("credentials refreshed, forcing reconnect");
                        continue;
                    }
                    LinkEnd::Closed | LinkEnd::Failed => {}
                }
            }
            Err(e) => {
                warn!(error = %e, url = %inner.url, "socket dial failed");
                inner.set_status(ConnectionStatus::Disconnected);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                attempts = inner.policy.max_attempts,
                url = %inner.url,
                "socket reconnect attempts exhausted"
            );
            inner.set_status(ConnectionStatus::Failed);
            return;
        };

        debug!(
            delay_ms = delay.as_millis() as u64,
            failures = backoff.failures(),
            "scheduling socket reconnect"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = await_refresh(&mut refresh_rx) => {
                debug!("credentials refreshed, superseding scheduled reconnect");
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    inner.set_status(ConnectionStatus::Disconnected);
}

/// Dial with the current token; on an auth rejection run the shared
/// single-flight refresh once and retry. If the refresh itself fails the
/// original dial error surfaces unchanged.
async fn open_link(inner: &Inner) -> Result<Box<dyn SocketLink>, StagelinkError> {
    let token = inner.auth.current().await?;
    match inner.dialer.dial(&inner.url, &token).await {
        Ok(link) => Ok(link),
        Err(original @ StagelinkError::Auth { .. }) => {
            debug!("dial rejected as unauthenticated, refreshing credentials");
            match inner.auth.refresh().await {
                Ok(token) => inner.dialer.dial(&inner.url, &token).await,
                Err(refresh_err) => {
                    warn!(error = %refresh_err, "credential refresh failed");
                    Err(original)
                }
            }
        }
        Err(e) => Err(e),
    }
}

async fn drive_link(
    inner: &Inner,
    mut link: Box<dyn SocketLink>,
    cancel: &CancellationToken,
    refresh_rx: &mut broadcast::Receiver<()>,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
) -> LinkEnd {
    let start = tokio::time::Instant::now() + inner.heartbeat;
    let mut heartbeat = tokio::time::interval_at(start, inner.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The select only picks the next piece of work; the link I/O itself runs
    // afterwards so the link is mutably borrowed by one place at a time.
    enum Work {
        Cancel,
        Refresh,
        Outbound(Option<OutboundFrame>),
        Ping,
        Inbound(Option<Result<String, StagelinkError>>),
    }

    loop {
        let work = tokio::select! {
            _ = cancel.cancelled() => Work::Cancel,
            _ = await_refresh(refresh_rx) => Work::Refresh,
            maybe_frame = outbound_rx.recv() => Work::Outbound(maybe_frame),
            _ = heartbeat.tick() => Work::Ping,
            next = link.next_text() => Work::Inbound(next),
        };

        match work {
            Work::Cancel => {
                link.close().await;
                return LinkEnd::Cancelled;
            }
            Work::Refresh => {
                link.close().await;
                return LinkEnd::Refresh;
            }
            Work::Outbound(Some(frame)) => match frame.to_json() {
                Ok(text) => {
                    if let Err(e) = link.send_text(text).await {
                        warn!(error = %e, "socket write failed");
                        return LinkEnd::Failed;
                    }
                }
                Err(e) => warn!(error = %e, "unserializable outbound frame dropped"),
            },
            // Supervisor side dropped; treat as teardown.
            Work::Outbound(None) => {
                link.close().await;
                return LinkEnd::Cancelled;
            }
            Work::Ping => {
                if let Err(e) = link.ping().await {
                    warn!(error = %e, "heartbeat ping failed");
                    return LinkEnd::Failed;
                }
            }
            Work::Inbound(None) => {
                debug!("socket closed by peer");
                return LinkEnd::Closed;
            }
            Work::Inbound(Some(Err(e))) => {
                warn!(error = %e, "socket read failed");
                return LinkEnd::Failed;
            }
            Work::Inbound(Some(Ok(text))) => match InboundFrame::parse(&text) {
                Ok(frame) => inner.deliver(frame),
                Err(e) => warn!(error = %e, "invalid inbound frame dropped"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelink_auth::RefreshBus;
    use stagelink_core::Mode;
    use stagelink_test_utils::{MockDialer, StaticCredentials};
    use std::sync::Mutex as StdMutex;

    struct CollectSink(Arc<StdMutex<Vec<InboundFrame>>>);

    impl FrameSink for CollectSink {
        fn on_frame(&self, frame: InboundFrame) {
            self.0.lock().unwrap().push(frame);
        }
    }

    fn collect_sink() -> (Arc<dyn FrameSink>, Arc<StdMutex<Vec<InboundFrame>>>) {
        let frames = Arc::new(StdMutex::new(Vec::new()));
        (Arc::new(CollectSink(frames.clone())), frames)
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    struct Fixture {
        supervisor: SocketSupervisor,
        dialer: Arc<MockDialer>,
        creds: Arc<StaticCredentials>,
        auth: Arc<RefreshCoordinator>,
    }

    fn fixture(creds: StaticCredentials) -> Fixture {
        let dialer = Arc::new(MockDialer::new());
        let creds = Arc::new(creds);
        let auth = Arc::new(RefreshCoordinator::new(creds.clone(), RefreshBus::new()));
        let supervisor = SocketSupervisor::builder("ws://event.test/socket")
            .dialer(dialer.clone())
            .auth(auth.clone())
            .policy(fast_policy())
            .heartbeat(Duration::from_secs(60))
            .build()
            .unwrap();
        Fixture {
            supervisor,
            dialer,
            creds,
            auth,
        }
    }

    async fn wait_status(
        rx: &mut watch::Receiver<ConnectionStatus>,
        want: ConnectionStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *rx.borrow() == want {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want}"));
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[test]
    fn build_requires_url_dialer_and_auth() {
        assert!(matches!(
            SocketSupervisorBuilder::new("").build().unwrap_err(),
            StagelinkError::Config(_)
        ));
        assert!(SocketSupervisorBuilder::new("ws://x").build().is_err());
    }

    #[tokio::test]
    async fn connect_dials_with_current_token() {
        let fx = fixture(StaticCredentials::new("tok-1"));
        let _handle = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        assert_eq!(
            fx.dialer.dials(),
            vec![("ws://event.test/socket".to_string(), "tok-1".to_string())]
        );
        fx.supervisor.disconnect();
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn frames_reach_the_currently_installed_sink() {
        let fx = fixture(StaticCredentials::new("tok"));
        let handle = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        let (sink_a, frames_a) = collect_sink();
        fx.supervisor.set_sink(sink_a);
        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        handle.push_text(r#"{"type":"typing","user_name":"Ada"}"#);
        assert!(wait_for(|| frames_a.lock().unwrap().len() == 1).await);

        // Swap sinks mid-connection; the subscription is untouched.
        let (sink_b, frames_b) = collect_sink();
        fx.supervisor.set_sink(sink_b);
        handle.push_text(r#"{"type":"ai_response","content":"hi"}"#);
        assert!(wait_for(|| frames_b.lock().unwrap().len() == 1).await);

        assert_eq!(frames_a.lock().unwrap().len(), 1, "old sink sees nothing new");
        assert_eq!(frames_b.lock().unwrap()[0].kind, "ai_response");
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn invalid_frames_are_dropped_without_killing_the_connection() {
        let fx = fixture(StaticCredentials::new("tok"));
        let handle = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        let (sink, frames) = collect_sink();
        fx.supervisor.set_sink(sink);
        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        handle.push_text(r#"{"content":"no type tag"}"#);
        handle.push_text("not json at all");
        handle.push_text(r#"{"type":"typing"}"#);

        assert!(wait_for(|| frames.lock().unwrap().len() == 1).await);
        assert_eq!(frames.lock().unwrap()[0].kind, "typing");
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn auth_rejection_refreshes_once_and_retries() {
        let fx = fixture(StaticCredentials::with_refresh("stale", "fresh"));
        fx.dialer.reject_auth("token expired");
        let _handle = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        assert_eq!(
            fx.dialer.dials(),
            vec![
                ("ws://event.test/socket".to_string(), "stale".to_string()),
                ("ws://event.test/socket".to_string(), "fresh".to_string()),
            ]
        );
        assert_eq!(fx.creds.refresh_calls(), 1);
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn failed_refresh_keeps_dialing_with_the_old_token() {
        let fx = fixture(StaticCredentials::failing_refresh("stale"));
        // Every dial is rejected; refresh never yields a new token.
        for _ in 0..8 {
            fx.dialer.reject_auth("token expired");
        }

        fx.supervisor.connect();
        assert!(wait_for(|| fx.dialer.dial_count() >= 2).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(fx.dialer.dials().iter().all(|(_, token)| token == "stale"));
        assert!(fx.creds.refresh_calls() >= 1);
        assert_eq!(*fx.supervisor.status().borrow(), ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn exhaustion_settles_on_a_terminal_status() {
        // Nothing scripted: every dial fails with a transport error.
        let fx = fixture(StaticCredentials::new("tok"));
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Failed).await;

        // Initial dial plus one per allowed retry (fast_policy allows 3).
        assert_eq!(fx.dialer.dial_count(), 4);

        // An explicit connect starts a fresh attempt cycle.
        let _handle = fx.dialer.accept();
        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn reconnects_after_abrupt_close() {
        let fx = fixture(StaticCredentials::new("tok"));
        let first = fx.dialer.accept();
        let _second = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        first.push_error("connection reset");
        assert!(wait_for(|| fx.dialer.dial_count() == 2).await);
        wait_status(&mut status, ConnectionStatus::Connected).await;
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn refresh_notification_forces_reconnect() {
        let fx = fixture(StaticCredentials::new("tok"));
        let _first = fx.dialer.accept();
        let _second = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;
        assert_eq!(fx.dialer.dial_count(), 1);

        fx.auth.bus().notify();
        assert!(wait_for(|| fx.dialer.dial_count() == 2).await);
        wait_status(&mut status, ConnectionStatus::Connected).await;
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn disconnect_then_connect_never_overlaps_links() {
        let fx = fixture(StaticCredentials::new("tok"));
        let first = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        fx.supervisor.disconnect();
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
        // No reconnect attempts after an explicit disconnect.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.dialer.dial_count(), 1);

        let _second = fx.dialer.accept();
        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;
        assert_eq!(fx.dialer.dial_count(), 2);
        assert!(first.is_closed() || first.ping_count() == 0);
        fx.supervisor.disconnect();
    }

    #[tokio::test]
    async fn send_serializes_over_the_live_link() {
        let fx = fixture(StaticCredentials::new("tok"));
        let handle = fx.dialer.accept();
        let mut status = fx.supervisor.status();

        fx.supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;

        fx.supervisor
            .send(OutboundFrame::UserMessage {
                content: "hello".into(),
                message_type: Mode::Ai,
            })
            .unwrap();

        assert!(wait_for(|| handle.sent().len() == 1).await);
        let sent: serde_json::Value = serde_json::from_str(&handle.sent()[0]).unwrap();
        assert_eq!(sent["type"], "user_message");
        assert_eq!(sent["message_type"], "ai");
        fx.supervisor.disconnect();

        let err = fx
            .supervisor
            .send(OutboundFrame::TeamBroadcast { content: "x".into() })
            .unwrap_err();
        assert!(matches!(err, StagelinkError::Channel { .. }));
    }

    #[tokio::test]
    async fn heartbeat_pings_periodically() {
        let dialer = Arc::new(MockDialer::new());
        let creds = Arc::new(StaticCredentials::new("tok"));
        let auth = Arc::new(RefreshCoordinator::new(creds, RefreshBus::new()));
        let supervisor = SocketSupervisor::builder("ws://event.test/socket")
            .dialer(dialer.clone())
            .auth(auth)
            .policy(fast_policy())
            .heartbeat(Duration::from_millis(40))
            .build()
            .unwrap();
        let handle = dialer.accept();
        let mut status = supervisor.status();

        supervisor.connect();
        wait_status(&mut status, ConnectionStatus::Connected).await;
        assert!(wait_for(|| handle.ping_count() >= 2).await);
        supervisor.disconnect();
    }
}
