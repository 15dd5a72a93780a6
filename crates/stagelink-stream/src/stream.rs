// SPDX-FileCopyrightText: 2026 Stagelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnecting SSE event stream.
//!
//! [`EventStream`] wraps one server-push connection to one endpoint and owns
//! its whole lifecycle: exponential-backoff reconnection, credential-refresh
//! coordination, and per-event JSON decoding. Consumers register listeners
//! for the event types declared at construction; the reserved lifecycle
//! events `connected`, `disconnected`, and `error` are always available.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stagelink_auth::{drain_refresh, RefreshBus, RefreshCoordinator};
use stagelink_core::{Backoff, ReconnectPolicy, StagelinkError};

use crate::listener::{dispatch, Listener, ListenerId, ListenerRegistry};

/// Reserved lifecycle event names, deliverable regardless of the configured
/// event-type set.
pub mod lifecycle {
    /// The underlying connection opened.
    pub const CONNECTED: &str = "connected";
    /// The underlying connection closed (any reason).
    pub const DISCONNECTED: &str = "disconnected";
    /// A transport, decode, or terminal reconnect error.
    pub const ERROR: &str = "error";
}

/// Builder for [`EventStream`].
pub struct EventStreamBuilder {
    endpoint: String,
    event_types: HashSet<String>,
    policy: ReconnectPolicy,
    refresh: Option<RefreshBus>,
    auth: Option<Arc<RefreshCoordinator>>,
    client: Option<reqwest::Client>,
}

impl EventStreamBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            event_types: HashSet::new(),
            policy: ReconnectPolicy::default(),
            refresh: None,
            auth: None,
            client: None,
        }
    }

    /// Declare the closed set of acceptable event-type names for this feed.
    pub fn event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach the credentials-refreshed bus; a notification force-reconnects.
    ///
    /// For authenticated feeds prefer [`auth`](Self::auth), which carries its
    /// own bus alongside the token source.
    pub fn refresh_bus(mut self, bus: RefreshBus) -> Self {
        self.refresh = Some(bus);
        self
    }

    /// Attach the refresh coordinator; its current token is sent on each
    /// open, an auth rejection runs one shared refresh and retries, and its
    /// bus force-reconnects the stream after out-of-band renewals.
    pub fn auth(mut self, auth: Arc<RefreshCoordinator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the stream. A missing endpoint is fatal here, not at connect.
    pub fn build(self) -> Result<EventStream, StagelinkError> {
        if self.endpoint.trim().is_empty() {
            return Err(StagelinkError::Config(
                "event stream endpoint must not be empty".into(),
            ));
        }

        Ok(EventStream {
            inner: Arc::new(Inner {
                endpoint: self.endpoint,
                event_types: self.event_types,
                policy: self.policy,
                client: self.client.unwrap_or_default(),
                refresh: self.refresh,
                auth: self.auth,
                registry: Mutex::new(ListenerRegistry::new()),
                conn: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        })
    }
}

/// A reconnecting SSE client for one endpoint.
pub struct EventStream {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

struct Inner {
    endpoint: String,
    event_types: HashSet<String>,
    policy: ReconnectPolicy,
    client: reqwest::Client,
    refresh: Option<RefreshBus>,
    auth: Option<Arc<RefreshCoordinator>>,
    registry: Mutex<ListenerRegistry>,
    conn: Mutex<Option<Conn>>,
    connected: AtomicBool,
}

struct Conn {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn conn(&self) -> MutexGuard<'_, Option<Conn>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: &str, payload: &Value) {
        // Snapshot under the lock, dispatch outside it: a callback is free
        // to register or remove listeners on this same stream.
        let entries = self.registry().snapshot(event);
        dispatch(event, payload, &entries);
    }
}

impl EventStream {
    /// Open the underlying connection if not already open.
    ///
    /// Idempotent: a second call while the connection task is live is a
    /// no-op. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut conn = self.inner.conn();
        if let Some(existing) = conn.as_ref() {
            if !existing.task.is_finished() {
                debug!(endpoint = %self.inner.endpoint, "already connected");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&self.inner), cancel.clone()));
        *conn = Some(Conn { cancel, task });
    }

    /// Close the connection and suppress automatic reconnection until the
    /// next `connect()`.
    ///
    /// Cancels any pending backoff timer and drops the refresh-bus
    /// subscription held by the connection task.
    pub fn disconnect(&self) {
        let conn = self.inner.conn().take();
        if let Some(conn) = conn {
            conn.cancel.cancel();
            conn.task.abort();
            if self.inner.connected.swap(false, Ordering::SeqCst) {
                self.inner
                    .emit(lifecycle::DISCONNECTED, &json!({"reason": "disconnect"}));
            }
            info!(endpoint = %self.inner.endpoint, "event stream disconnected");
        }
    }

    /// Register a listener; returns the id for [`off`](Self::off).
    pub fn on(&self, event: &str, callback: Listener) -> ListenerId {
        self.inner.registry().on(event, callback)
    }

    /// Unregister a listener.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.registry().off(event, id)
    }

    /// True while the underlying connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Why the read loop ended.
enum ReadEnd {
    Cancelled,
    Refresh,
    Closed,
    Failed,
}

impl ReadEnd {
    fn reason(&self) -> &'static str {
        match self {
            ReadEnd::Cancelled => "disconnect",
            ReadEnd::Refresh => "credential-refresh",
            ReadEnd::Closed => "closed",
            ReadEnd::Failed => "error",
        }
    }
}

async fn run_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    // Subscribed for the whole connection lifetime; dropped on teardown.
    let mut refresh_rx = inner
        .refresh
        .as_ref()
        .map(RefreshBus::subscribe)
        .or_else(|| inner.auth.as_ref().map(|auth| auth.bus().subscribe()));
    let mut backoff = Backoff::new(inner.policy);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match open_stream(&inner).await {
            Ok(response) => {
                // The stream just opened with current credentials; refresh
                // notifications that raced the open are stale.
                if let Some(rx) = refresh_rx.as_mut() {
                    drain_refresh(rx);
                }
                backoff.reset();
                inner.connected.store(true, Ordering::SeqCst);
                info!(endpoint = %inner.endpoint, "event stream connected");
                inner.emit(lifecycle::CONNECTED, &json!({}));

                let end = read_events(&inner, response, &cancel, refresh_rx.as_mut()).await;

                inner.connected.store(false, Ordering::SeqCst);
                inner.emit(lifecycle::DISCONNECTED, &json!({"reason": end.reason()}));

                match end {
                    ReadEnd::Cancelled => break,
                    ReadEnd::Refresh => {
                        debug!("credentials refreshed, forcing reconnect");
                        continue;
                    }
                    ReadEnd::Closed | ReadEnd::Failed => {}
                }
            }
            Err(e) => {
                warn!(error = %e, endpoint = %inner.endpoint, "event stream open failed");
                inner.emit(
                    lifecycle::ERROR,
                    &json!({"message": e.to_string(), "transient": true}),
                );
            }
        }

        let Some(delay) = backoff.next_delay() else {
            warn!(
                attempts = inner.policy.max_attempts,
                endpoint = %inner.endpoint,
                "reconnect attempts exhausted"
            );
            inner.emit(
                lifecycle::ERROR,
                &json!({
                    "message": "reconnect attempts exhausted",
                    "attempts": inner.policy.max_attempts,
                    "terminal": true,
                }),
            );
            break;
        };

        debug!(
            delay_ms = delay.as_millis() as u64,
            failures = backoff.failures(),
            "scheduling reconnect"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wait_refresh(refresh_rx.as_mut()) => {
                debug!("credentials refreshed, superseding scheduled reconnect");
            }
            _ = tokio::time::sleep(delay) => {}
        }

        // Disconnect may have landed while the timer was pending.
        if cancel.is_cancelled() {
            break;
        }
    }
}

/// Resolve only when a refresh notification arrives; pend forever otherwise.
async fn wait_refresh(rx: Option<&mut broadcast::Receiver<()>>) {
    match rx {
        Some(rx) => stagelink_auth::await_refresh(rx).await,
        None => std::future::pending().await,
    }
}

/// Open the SSE request with the current token; on an auth rejection run the
/// shared single-flight refresh once and retry. If the refresh itself fails
/// the original rejection surfaces unchanged.
async fn open_stream(inner: &Inner) -> Result<reqwest::Response, StagelinkError> {
    let token = match &inner.auth {
        Some(auth) => Some(auth.current().await?),
        None => None,
    };

    match try_open(inner, token.as_deref()).await {
        Err(original @ StagelinkError::Auth { .. }) => match &inner.auth {
            Some(auth) => {
                debug!("endpoint rejected credentials, refreshing");
                match auth.refresh().await {
                    Ok(token) => try_open(inner, Some(&token)).await,
                    Err(refresh_err) => {
                        warn!(error = %refresh_err, "credential refresh failed");
                        Err(original)
                    }
                }
            }
            None => Err(original),
        },
        result => result,
    }
}

async fn try_open(inner: &Inner, token: Option<&str>) -> Result<reqwest::Response, StagelinkError> {
    let mut request = inner
        .client
        .get(&inner.endpoint)
        .header(reqwest::header::ACCEPT, "text/event-stream");

    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| StagelinkError::Transport {
        message: format!("SSE connect failed: {e}"),
        source: Some(Box::new(e)),
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(StagelinkError::Auth {
            message: format!("SSE endpoint rejected credentials ({status})"),
            source: None,
        });
    }
    if !status.is_success() {
        return Err(StagelinkError::transport(format!(
            "SSE endpoint returned {status}"
        )));
    }

    Ok(response)
}

async fn read_events(
    inner: &Inner,
    response: reqwest::Response,
    cancel: &CancellationToken,
    mut refresh_rx: Option<&mut broadcast::Receiver<()>>,
) -> ReadEnd {
    let mut events = response.bytes_stream().eventsource();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ReadEnd::Cancelled,
            _ = wait_refresh(refresh_rx.as_mut().map(|r| &mut **r)) => return ReadEnd::Refresh,
            next = events.next() => match next {
                None => return ReadEnd::Closed,
                Some(Err(e)) => {
                    warn!(error = %e, "event stream transport error");
                    inner.emit(
                        lifecycle::ERROR,
                        &json!({"message": format!("stream error: {e}"), "transient": true}),
                    );
                    return ReadEnd::Failed;
                }
                Some(Ok(event)) => {
                    let name = if event.event.is_empty() {
                        "message"
                    } else {
                        event.event.as_str()
                    };

                    // Event types outside the configured set are ignored;
                    // servers may add new feeds without breaking clients.
                    if !inner.event_types.contains(name) {
                        continue;
                    }

                    match serde_json::from_str::<Value>(&event.data) {
                        Ok(payload) => inner.emit(name, &payload),
                        Err(e) => {
                            warn!(event = name, error = %e, "malformed event payload");
                            inner.emit(
                                lifecycle::ERROR,
                                &json!({
                                    "message": format!("malformed payload for event `{name}`: {e}"),
                                    "event": name,
                                }),
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelink_test_utils::StaticCredentials;
    use std::time::Duration;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    fn slow_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        }
    }

    fn collector(
        stream: &EventStream,
        event: &str,
    ) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        stream.on(
            event,
            Box::new(move |payload| {
                seen_clone.lock().unwrap().push(payload.clone());
                Ok(())
            }),
        );
        seen
    }

    async fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    async fn sse_server(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn build_rejects_empty_endpoint() {
        let err = EventStreamBuilder::new("  ").build().unwrap_err();
        assert!(matches!(err, StagelinkError::Config(_)));
    }

    #[tokio::test]
    async fn delivers_configured_events_in_order() {
        let body = "event: stats_update\ndata: {\"n\":1}\n\n\
                    event: future_thing\ndata: {}\n\n\
                    event: stats_update\ndata: {\"n\":2}\n\n";
        let server = sse_server(body, 200).await;

        let stream = EventStreamBuilder::new(server.uri())
            .event_types(["stats_update"])
            .policy(slow_policy())
            .build()
            .unwrap();
        let seen = collector(&stream, "stats_update");

        stream.connect();
        assert!(
            wait_for(|| seen.lock().unwrap().len() == 2, Duration::from_secs(2)).await,
            "expected both stats_update events"
        );
        let payloads = seen.lock().unwrap().clone();
        assert_eq!(payloads[0]["n"], 1);
        assert_eq!(payloads[1]["n"], 2);
        stream.disconnect();
    }

    #[tokio::test]
    async fn malformed_payload_is_nonfatal() {
        let body = "event: stats_update\ndata: {not json\n\n\
                    event: stats_update\ndata: {\"n\":7}\n\n";
        let server = sse_server(body, 200).await;

        let stream = EventStreamBuilder::new(server.uri())
            .event_types(["stats_update"])
            .policy(slow_policy())
            .build()
            .unwrap();
        let seen = collector(&stream, "stats_update");
        let errors = collector(&stream, lifecycle::ERROR);

        stream.connect();
        assert!(
            wait_for(|| seen.lock().unwrap().len() == 1, Duration::from_secs(2)).await,
            "good event after the bad one must still arrive"
        );
        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["event"], "stats_update");
        stream.disconnect();
    }

    #[tokio::test]
    async fn terminal_error_emitted_exactly_once() {
        let server = sse_server("", 500).await;

        let stream = EventStreamBuilder::new(server.uri())
            .policy(fast_policy(2))
            .build()
            .unwrap();
        let errors = collector(&stream, lifecycle::ERROR);
        let connected = collector(&stream, lifecycle::CONNECTED);

        stream.connect();
        assert!(
            wait_for(
                || errors
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|e| e["terminal"] == true),
                Duration::from_secs(2)
            )
            .await
        );
        // Give it time to (incorrectly) retry further.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let errors = errors.lock().unwrap().clone();
        let terminal: Vec<_> = errors.iter().filter(|e| e["terminal"] == true).collect();
        assert_eq!(terminal.len(), 1, "exactly one terminal error");
        assert_eq!(terminal[0]["attempts"], 2);
        assert!(connected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_supersedes_scheduled_reconnect() {
        // The SSE body completes immediately, so after the first connection
        // the stream schedules a 5s backoff; a refresh must preempt it.
        let server = sse_server("", 200).await;
        let bus = RefreshBus::new();

        let stream = EventStreamBuilder::new(server.uri())
            .policy(slow_policy())
            .refresh_bus(bus.clone())
            .build()
            .unwrap();
        let connected = collector(&stream, lifecycle::CONNECTED);

        stream.connect();
        assert!(
            wait_for(|| connected.lock().unwrap().len() == 1, Duration::from_secs(2)).await
        );

        bus.notify();
        assert!(
            wait_for(|| connected.lock().unwrap().len() >= 2, Duration::from_secs(2)).await,
            "refresh must reconnect without waiting out the backoff"
        );

        stream.disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.subscriber_count(), 0, "subscription released on teardown");
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let server = sse_server("", 200).await;
        let bus = RefreshBus::new();

        let stream = EventStreamBuilder::new(server.uri())
            .policy(slow_policy())
            .refresh_bus(bus.clone())
            .build()
            .unwrap();
        let connected = collector(&stream, lifecycle::CONNECTED);

        stream.connect();
        assert!(
            wait_for(|| connected.lock().unwrap().len() == 1, Duration::from_secs(2)).await
        );

        // First connection has closed; a 5s reconnect timer is now pending.
        stream.disconnect();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(connected.lock().unwrap().len(), 1, "no further attempts");
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listener_registered_from_a_callback_receives_later_events() {
        let body = "event: stats_update\ndata: {\"n\":1}\n\n";
        let server = sse_server(body, 200).await;

        let stream = Arc::new(
            EventStreamBuilder::new(server.uri())
                .event_types(["stats_update"])
                .policy(slow_policy())
                .build()
                .unwrap(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));

        // The connected callback subscribes on the same stream it came from.
        let reentrant = Arc::clone(&stream);
        let seen_clone = seen.clone();
        stream.on(
            lifecycle::CONNECTED,
            Box::new(move |_| {
                let seen = seen_clone.clone();
                reentrant.on(
                    "stats_update",
                    Box::new(move |payload| {
                        seen.lock().unwrap().push(payload.clone());
                        Ok(())
                    }),
                );
                Ok(())
            }),
        );

        stream.connect();
        assert!(
            wait_for(|| seen.lock().unwrap().len() == 1, Duration::from_secs(2)).await,
            "listener added from inside a callback must see subsequent events"
        );
        stream.disconnect();
    }

    #[tokio::test]
    async fn auth_rejection_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: stats_update\ndata: {\"n\":1}\n\n"),
            )
            .mount(&server)
            .await;

        let creds = Arc::new(StaticCredentials::with_refresh("stale", "fresh"));
        let auth = Arc::new(RefreshCoordinator::new(creds.clone(), RefreshBus::new()));

        let stream = EventStreamBuilder::new(server.uri())
            .event_types(["stats_update"])
            .policy(slow_policy())
            .auth(auth)
            .build()
            .unwrap();
        let seen = collector(&stream, "stats_update");
        let connected = collector(&stream, lifecycle::CONNECTED);

        stream.connect();
        assert!(
            wait_for(|| seen.lock().unwrap().len() == 1, Duration::from_secs(2)).await,
            "events must flow after the refreshed retry"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(creds.refresh_calls(), 1);
        assert_eq!(
            connected.lock().unwrap().len(),
            1,
            "the in-dial refresh must not force a rebuild of the new connection"
        );
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        stream.disconnect();
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_the_original_rejection() {
        let server = sse_server("", 401).await;
        let creds = Arc::new(StaticCredentials::failing_refresh("stale"));
        let auth = Arc::new(RefreshCoordinator::new(creds.clone(), RefreshBus::new()));

        let stream = EventStreamBuilder::new(server.uri())
            .policy(fast_policy(1))
            .auth(auth)
            .build()
            .unwrap();
        let errors = collector(&stream, lifecycle::ERROR);

        stream.connect();
        assert!(
            wait_for(
                || errors.lock().unwrap().iter().any(|e| e["terminal"] == true),
                Duration::from_secs(2)
            )
            .await
        );

        assert!(creds.refresh_calls() >= 1);
        let errors = errors.lock().unwrap().clone();
        assert!(
            errors.iter().any(|e| e["message"]
                .as_str()
                .unwrap_or_default()
                .contains("rejected credentials")),
            "the dial rejection, not the refresh failure, is what surfaces"
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let body = "event: stats_update\ndata: {\"n\":1}\n\n";
        let server = sse_server(body, 200).await;
        let bus = RefreshBus::new();

        let stream = EventStreamBuilder::new(server.uri())
            .event_types(["stats_update"])
            .policy(slow_policy())
            .refresh_bus(bus.clone())
            .build()
            .unwrap();

        stream.connect();
        stream.connect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(bus.subscriber_count(), 1, "one connection task only");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        stream.disconnect();
    }
}
