//! Session lifecycle and bounded reconnection.
//!
//! ```text
//!            start()
//!   Idle ───────────► Connecting ──qr──► AwaitingChallenge
//!                        │  ▲                  │
//!                 start  │  │ next attempt     │ ready
//!                 failed ▼  │                  ▼
//!                      Degraded            Ready ──disconnected──► Disconnected
//!                        │
//!                        └── attempts exhausted ──► Disconnected (one whatsappError)
//! ```
//!
//! `Disconnected` is only left through an explicit [`ReconnectionController::start`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::fanout::{EventHub, RelayEvent};
use crate::session::{ChatSummary, SessionClient, SessionEvent};

/// Lifecycle state of the messaging session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    AwaitingChallenge,
    Ready,
    Degraded,
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingChallenge => "awaiting_challenge",
            SessionState::Ready => "ready",
            SessionState::Degraded => "degraded",
            SessionState::Disconnected => "disconnected",
        };
        write!(f, "{}", s)
    }
}

/// Session attributes owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    /// Failed start attempts in the current retry round.
    pub retry_count: u32,
    pub last_fault: Option<String>,
    /// Chat list loaded when the session became ready.
    pub chats: Vec<ChatSummary>,
}

/// Shared, read-mostly handle to the session.
///
/// Only the controller mutates it; the fan-out and HTTP layers read it.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == SessionState::Ready
    }

    pub async fn chats(&self) -> Vec<ChatSummary> {
        self.inner.read().await.chats.clone()
    }

    /// Replace the whole session record.
    pub async fn replace(&self, session: Session) {
        *self.inner.write().await = session;
    }

    async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = self.inner.write().await;
        f(&mut session)
    }
}

/// Bounded retry policy for starting the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Drives the session adapter through start-up and bounded retries, and
/// applies lifecycle events to the shared [`Session`].
pub struct ReconnectionController {
    client: Arc<dyn SessionClient>,
    session: SessionHandle,
    hub: Arc<EventHub>,
    policy: RetryPolicy,
    retrying: Arc<AtomicBool>,
}

impl ReconnectionController {
    pub fn new(
        client: Arc<dyn SessionClient>,
        session: SessionHandle,
        hub: Arc<EventHub>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            session,
            hub,
            policy,
            retrying: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Start the session from `Idle`, or restart it after a terminal
    /// disconnect. Returns the retry task, or `None` if the session is
    /// already starting or running.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let state = self.session.state().await;
        if !matches!(state, SessionState::Idle | SessionState::Disconnected) {
            tracing::warn!(%state, "Ignoring start request, session is not idle");
            return None;
        }
        self.spawn_retry_loop()
    }

    fn spawn_retry_loop(&self) -> Option<JoinHandle<()>> {
        if self.retrying.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session retry loop already running");
            return None;
        }

        let client = Arc::clone(&self.client);
        let session = self.session.clone();
        let hub = Arc::clone(&self.hub);
        let policy = self.policy.clone();
        let retrying = Arc::clone(&self.retrying);

        Some(tokio::spawn(async move {
            retry_loop(client.as_ref(), &session, &hub, &policy).await;
            retrying.store(false, Ordering::SeqCst);
        }))
    }

    /// Apply one lifecycle event from the adapter.
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::QrChallenge(qr) => {
                self.session
                    .update(|s| {
                        if matches!(
                            s.state,
                            SessionState::Connecting
                                | SessionState::AwaitingChallenge
                                | SessionState::Degraded
                        ) {
                            s.state = SessionState::AwaitingChallenge;
                        }
                    })
                    .await;
                tracing::info!("QR challenge received");
                self.hub.broadcast(RelayEvent::Qr(qr));
            }
            SessionEvent::Ready => self.on_ready().await,
            SessionEvent::Disconnected(reason) => {
                self.session
                    .update(|s| {
                        s.state = SessionState::Disconnected;
                        s.last_fault = Some(reason.clone());
                        s.chats.clear();
                    })
                    .await;
                tracing::warn!(%reason, "Session disconnected");
                self.hub
                    .broadcast(RelayEvent::WhatsappDisconnected { reason });
            }
            SessionEvent::Fault(reason) => {
                let previous = self
                    .session
                    .update(|s| {
                        let previous = s.state;
                        if !matches!(previous, SessionState::Idle | SessionState::Disconnected) {
                            s.state = SessionState::Degraded;
                            s.last_fault = Some(reason.clone());
                        }
                        previous
                    })
                    .await;
                if matches!(previous, SessionState::Idle | SessionState::Disconnected) {
                    tracing::warn!(state = %previous, %reason, "Ignoring fault, session is not running");
                    return;
                }
                tracing::warn!(%reason, "Session fault, reconnecting");
                self.spawn_retry_loop();
            }
            SessionEvent::Message(msg) => {
                tracing::debug!(chat_id = %msg.from, "Controller ignores message events");
            }
        }
    }

    async fn on_ready(&self) {
        let state = self.session.state().await;
        if !matches!(state, SessionState::Connecting | SessionState::AwaitingChallenge) {
            tracing::warn!(%state, "Ignoring ready event");
            return;
        }

        let chats = match self.client.list_chats().await {
            Ok(chats) => chats.into_iter().map(ChatSummary::normalized).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load chats");
                Vec::new()
            }
        };

        self.session
            .update(|s| {
                s.state = SessionState::Ready;
                s.retry_count = 0;
                s.last_fault = None;
                s.chats = chats.clone();
            })
            .await;
        tracing::info!(chats = chats.len(), "Session ready");
        self.hub.broadcast(RelayEvent::Ready { chats });
    }

    /// Reload the chat list from the session. Only valid while ready.
    pub async fn refresh_chats(&self) -> Result<Vec<ChatSummary>, SessionError> {
        if !self.session.is_ready().await {
            return Err(SessionError::NotReady);
        }

        let chats: Vec<ChatSummary> = self
            .client
            .list_chats()
            .await?
            .into_iter()
            .map(ChatSummary::normalized)
            .collect();
        self.session.update(|s| s.chats = chats.clone()).await;
        Ok(chats)
    }
}

/// Try to start the session up to `policy.max_attempts` times.
///
/// Exhausting the attempts leaves the session `Disconnected` and broadcasts
/// exactly one `whatsappError`.
async fn retry_loop(
    client: &dyn SessionClient,
    session: &SessionHandle,
    hub: &EventHub,
    policy: &RetryPolicy,
) {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        // Only the first attempt may leave Disconnected (an explicit restart).
        let proceed = session
            .update(|s| {
                if attempt > 1 && s.state == SessionState::Disconnected {
                    return false;
                }
                s.retry_count = attempt - 1;
                if matches!(
                    s.state,
                    SessionState::Idle | SessionState::Degraded | SessionState::Disconnected
                ) {
                    s.state = SessionState::Connecting;
                }
                true
            })
            .await;
        if !proceed {
            tracing::info!(attempt, "Session disconnected during retries, stopping");
            return;
        }
        tracing::info!(attempt, max_attempts, "Starting session");

        let reason = match client.start().await {
            Ok(()) => {
                tracing::info!(attempt, "Session started");
                return;
            }
            Err(e) => e.to_string(),
        };

        if attempt == max_attempts {
            session
                .update(|s| {
                    s.state = SessionState::Disconnected;
                    s.retry_count = attempt;
                    s.last_fault = Some(reason.clone());
                })
                .await;
            tracing::error!(attempts = max_attempts, error = %reason, "All session start attempts failed");
            hub.broadcast(RelayEvent::WhatsappError { error: reason });
            return;
        }

        let disconnected = session
            .update(|s| {
                if s.state == SessionState::Disconnected {
                    return true;
                }
                s.state = SessionState::Degraded;
                s.retry_count = attempt;
                s.last_fault = Some(reason.clone());
                false
            })
            .await;
        if disconnected {
            tracing::info!(attempt, error = %reason, "Session disconnected during retries, stopping");
            return;
        }
        tracing::warn!(
            attempt,
            error = %reason,
            delay_ms = policy.delay.as_millis() as u64,
            "Session start failed, retrying"
        );
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{EnvDefaults, SelectionStore};
    use crate::test_support::{FakeSession, MemoryStore, chat};

    fn controller(session_client: Arc<FakeSession>, max_attempts: u32) -> ReconnectionController {
        controller_with_delay(session_client, max_attempts, Duration::from_millis(5))
    }

    fn controller_with_delay(
        session_client: Arc<FakeSession>,
        max_attempts: u32,
        delay: Duration,
    ) -> ReconnectionController {
        let session = SessionHandle::new();
        let selection = Arc::new(SelectionStore::open(
            Arc::new(MemoryStore::new()),
            &EnvDefaults::default(),
        ));
        let hub = Arc::new(EventHub::new(session.clone(), selection));
        ReconnectionController::new(
            session_client,
            session,
            hub,
            RetryPolicy {
                max_attempts,
                delay,
            },
        )
    }

    /// Start successfully, leaving the session `Connecting`.
    async fn connect(ctrl: &ReconnectionController) {
        ctrl.start().await.unwrap().await.unwrap();
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<RelayEvent>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_start_success_enters_connecting() {
        let (client, _rx) = FakeSession::new();
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);

        let handle = ctrl.start().await.expect("retry loop spawned");
        handle.await.unwrap();

        assert_eq!(client.start_calls(), 1);
        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Connecting);
        assert_eq!(session.retry_count, 0);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let (client, _rx) = FakeSession::new();
        client.push_start_result(Err("browser crashed".to_string()));
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        let mut events = ctrl.hub.subscribe();

        ctrl.start().await.unwrap().await.unwrap();

        assert_eq!(client.start_calls(), 2);
        assert_eq!(ctrl.session().state().await, SessionState::Connecting);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_disconnect_with_one_error_event() {
        let (client, _rx) = FakeSession::new();
        for _ in 0..3 {
            client.push_start_result(Err("timeout".to_string()));
        }
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        let mut events = ctrl.hub.subscribe();

        ctrl.start().await.unwrap().await.unwrap();

        assert_eq!(client.start_calls(), 3);
        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.retry_count, 3);
        assert!(session.last_fault.unwrap().contains("timeout"));

        let events = drain(&mut events);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RelayEvent::WhatsappError { error } if error.contains("timeout")));
    }

    #[tokio::test]
    async fn test_start_ignored_while_running() {
        let (client, _rx) = FakeSession::new();
        let ctrl = controller(Arc::new(client), 3);

        ctrl.start().await.unwrap().await.unwrap();
        assert!(ctrl.start().await.is_none());
    }

    #[tokio::test]
    async fn test_restart_after_terminal_disconnect() {
        let (client, _rx) = FakeSession::new();
        client.push_start_result(Err("down".to_string()));
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 1);

        ctrl.start().await.unwrap().await.unwrap();
        assert_eq!(ctrl.session().state().await, SessionState::Disconnected);

        ctrl.start().await.expect("restart allowed").await.unwrap();
        assert_eq!(client.start_calls(), 2);
        assert_eq!(ctrl.session().state().await, SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_qr_moves_to_awaiting_challenge_and_broadcasts() {
        let (client, _rx) = FakeSession::new();
        let ctrl = controller(Arc::new(client), 3);
        ctrl.start().await.unwrap().await.unwrap();
        let mut events = ctrl.hub.subscribe();

        ctrl.handle_event(SessionEvent::QrChallenge("qr-data".to_string()))
            .await;

        assert_eq!(ctrl.session().state().await, SessionState::AwaitingChallenge);
        assert_eq!(drain(&mut events), vec![RelayEvent::Qr("qr-data".to_string())]);
    }

    #[tokio::test]
    async fn test_ready_loads_chats_once() {
        let (client, _rx) = FakeSession::new();
        client.set_chats(vec![chat("111@c.us", "")]);
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        ctrl.start().await.unwrap().await.unwrap();
        let mut events = ctrl.hub.subscribe();

        ctrl.handle_event(SessionEvent::Ready).await;
        ctrl.handle_event(SessionEvent::Ready).await;

        assert_eq!(client.list_calls(), 1);
        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Ready);
        assert_eq!(session.chats.len(), 1);
        assert_eq!(session.chats[0].name, "Unknown");

        let events = drain(&mut events);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RelayEvent::Ready { chats } if chats.len() == 1));
    }

    #[tokio::test]
    async fn test_ready_with_chat_load_failure_still_ready() {
        let (client, _rx) = FakeSession::new();
        client.fail_list(true);
        let ctrl = controller(Arc::new(client), 3);
        connect(&ctrl).await;

        ctrl.handle_event(SessionEvent::Ready).await;

        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Ready);
        assert!(session.chats.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_records_reason_and_broadcasts() {
        let (client, _rx) = FakeSession::new();
        let ctrl = controller(Arc::new(client), 3);
        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;
        let mut events = ctrl.hub.subscribe();

        ctrl.handle_event(SessionEvent::Disconnected("LOGOUT".to_string()))
            .await;

        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.last_fault.as_deref(), Some("LOGOUT"));
        assert!(session.chats.is_empty());
        assert_eq!(
            drain(&mut events),
            vec![RelayEvent::WhatsappDisconnected {
                reason: "LOGOUT".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_no_automatic_reconnect_after_disconnect() {
        let (client, _rx) = FakeSession::new();
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;

        ctrl.handle_event(SessionEvent::Disconnected("LOGOUT".to_string()))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(client.start_calls(), 1);
        assert_eq!(ctrl.session().state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fault_degrades_and_restarts() {
        let (client, _rx) = FakeSession::new();
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;

        ctrl.handle_event(SessionEvent::Fault("page crashed".to_string()))
            .await;

        // The retry loop runs on its own task; give it a moment.
        for _ in 0..50 {
            if client.start_calls() > 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.start_calls(), 2);
        let session = ctrl.session().snapshot().await;
        assert_eq!(session.last_fault.as_deref(), Some("page crashed"));
    }

    #[tokio::test]
    async fn test_refresh_chats_requires_ready() {
        let (client, _rx) = FakeSession::new();
        client.set_chats(vec![chat("1@c.us", "Alice")]);
        let ctrl = controller(Arc::new(client), 3);

        assert!(matches!(
            ctrl.refresh_chats().await,
            Err(SessionError::NotReady)
        ));

        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;
        let chats = ctrl.refresh_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_ready_ignored_while_idle() {
        let (client, _rx) = FakeSession::new();
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        let mut events = ctrl.hub.subscribe();

        ctrl.handle_event(SessionEvent::Ready).await;

        assert_eq!(ctrl.session().state().await, SessionState::Idle);
        assert_eq!(client.list_calls(), 0);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_is_only_left_by_restart() {
        let (client, _rx) = FakeSession::new();
        let client = Arc::new(client);
        let ctrl = controller(client.clone(), 3);
        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;
        ctrl.handle_event(SessionEvent::Disconnected("LOGOUT".to_string()))
            .await;
        let mut events = ctrl.hub.subscribe();

        ctrl.handle_event(SessionEvent::Ready).await;
        ctrl.handle_event(SessionEvent::QrChallenge("qr".to_string()))
            .await;
        ctrl.handle_event(SessionEvent::Fault("crash".to_string()))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.last_fault.as_deref(), Some("LOGOUT"));
        assert_eq!(client.start_calls(), 1);
        assert_eq!(drain(&mut events), vec![RelayEvent::Qr("qr".to_string())]);

        connect(&ctrl).await;
        ctrl.handle_event(SessionEvent::Ready).await;
        assert_eq!(ctrl.session().state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_retry_loop_stops_when_disconnected() {
        let (client, _rx) = FakeSession::new();
        for _ in 0..3 {
            client.push_start_result(Err("timeout".to_string()));
        }
        let client = Arc::new(client);
        let ctrl = controller_with_delay(client.clone(), 3, Duration::from_millis(100));
        let mut events = ctrl.hub.subscribe();

        let handle = ctrl.start().await.unwrap();
        for _ in 0..50 {
            if client.start_calls() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        ctrl.handle_event(SessionEvent::Disconnected("LOGOUT".to_string()))
            .await;
        handle.await.unwrap();

        assert_eq!(client.start_calls(), 1);
        let session = ctrl.session().snapshot().await;
        assert_eq!(session.state, SessionState::Disconnected);
        assert_eq!(session.last_fault.as_deref(), Some("LOGOUT"));
        assert_eq!(
            drain(&mut events),
            vec![RelayEvent::WhatsappDisconnected {
                reason: "LOGOUT".to_string()
            }]
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::AwaitingChallenge.to_string(), "awaiting_challenge");
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
