//! Session controller: owns the connection state machine, drives
//! reconnection and keepalive, refreshes credentials mid-session, and
//! republishes transport events in normalized form on the event bus.
//!
//! All state transitions happen on one driver task per session. Transport
//! callbacks arrive on the event channel returned by the factory and are
//! consumed there, so no two transitions race. Disposal bumps a generation
//! counter; stale tasks from an old connection check it before touching
//! state.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::time::Instant;

use crate::backoff::{BackoffPolicy, RetryState};
use crate::credential::{Credential, CredentialProvider, SessionContext};
use crate::error::{ErrorKind, SessionError};
use crate::events::{
    ErrorEvent, EventBus, MessageReceived, ParticipantJoined, ParticipantLeft, QualityChanged,
    StateChanged,
};
use crate::keepalive::{KEEP_ALIVE_INTERVAL_MAX, KEEP_ALIVE_INTERVAL_MIN, KEEP_ALIVE_MAX_FAIL_TIME};
use crate::transport::{DisconnectReason, Transport, TransportEvent, TransportFactory};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REFRESH_LEAD: Duration = Duration::from_secs(30);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal unless a new `connect()` is issued.
    Disconnected,
    /// Terminal; requires an explicit `connect()` to recover.
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub auto_reconnect: bool,
    /// A connect attempt that has not reached `Connected` within this bound
    /// counts as a timeout error.
    pub connect_timeout: Duration,
    pub keepalive_interval_min: Duration,
    pub keepalive_interval_max: Duration,
    /// Pings failing continuously for longer than this force a reconnect.
    pub keepalive_max_fail_time: Duration,
    /// How long before credential expiry renewal starts.
    pub credential_refresh_lead: Duration,
    pub backoff: BackoffPolicy,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            auto_reconnect: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval_min: KEEP_ALIVE_INTERVAL_MIN,
            keepalive_interval_max: KEEP_ALIVE_INTERVAL_MAX,
            keepalive_max_fail_time: KEEP_ALIVE_MAX_FAIL_TIME,
            credential_refresh_lead: DEFAULT_REFRESH_LEAD,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Mutable book-keeping for one logical session. Owned exclusively by its
/// controller; every mutation happens on the driver task.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub credential: Option<Credential>,
    pub retry: Option<RetryState>,
    pub created_at: DateTime<Utc>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl SessionHandle {
    fn new() -> Self {
        Self {
            credential: None,
            retry: None,
            created_at: Utc::now(),
            last_connected_at: None,
            last_event_at: None,
        }
    }
}

/// Why a connection (or connection attempt) ended.
enum ConnectionOutcome {
    /// Caller-initiated teardown.
    Expected,
    /// Transport dropped or errored while connected.
    Lost(DisconnectReason),
    /// The connect attempt itself failed with a retryable error.
    AttemptFailed,
    /// Disposed or superseded by a newer connect.
    Superseded,
}

/// When to renew the current credential, and when to give up waiting.
struct RefreshSchedule {
    renew_at: Option<Instant>,
    /// Hard deadline at credential expiry; hitting it recycles the
    /// connection through the normal reconnect path.
    force_at: Option<Instant>,
}

impl RefreshSchedule {
    fn disarmed() -> Self {
        Self {
            renew_at: None,
            force_at: None,
        }
    }

    fn for_credential(credential: &Credential, lead: Duration) -> Self {
        let until_expiry = credential.time_until_expiry();
        let now = Instant::now();
        let lead_offset = if until_expiry > lead {
            until_expiry - lead
        } else {
            // Credential shorter than the lead time: renew at half-life.
            until_expiry / 2
        };
        Self {
            renew_at: Some(now + lead_offset),
            force_at: Some(now + until_expiry),
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}

pub struct SessionController {
    pub(crate) config: SessionConfig,
    credentials: Arc<dyn CredentialProvider>,
    transport_factory: Arc<dyn TransportFactory>,
    pub event_bus: Arc<EventBus>,

    state_tx: watch::Sender<SessionState>,
    handle: Mutex<SessionHandle>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    last_error: Mutex<Option<SessionError>>,

    is_running: AtomicBool,
    is_connecting: AtomicBool,
    expected_disconnect: AtomicBool,
    generation: AtomicU64,
    pub(crate) shutdown_notifier: Notify,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        credentials: Arc<dyn CredentialProvider>,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Arc::new(Self {
            config,
            credentials,
            transport_factory,
            event_bus: Arc::new(EventBus::new()),
            state_tx,
            handle: Mutex::new(SessionHandle::new()),
            transport: Mutex::new(None),
            last_error: Mutex::new(None),
            is_running: AtomicBool::new(false),
            is_connecting: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown_notifier: Notify::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch channel mirroring the state machine; handy for callers that
    /// want to await a particular state rather than poll the bus.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub async fn current_credential(&self) -> Option<Credential> {
        self.handle.lock().await.credential.clone()
    }

    pub async fn retry_state(&self) -> Option<RetryState> {
        self.handle.lock().await.retry.clone()
    }

    pub async fn created_at(&self) -> DateTime<Utc> {
        self.handle.lock().await.created_at
    }

    pub async fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        self.handle.lock().await.last_connected_at
    }

    pub async fn last_event_at(&self) -> Option<DateTime<Utc>> {
        self.handle.lock().await.last_event_at
    }

    pub(crate) async fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().await.clone()
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Connects the session, suspending until it is `Connected` or reaches
    /// a terminal state. While auto-reconnect is enabled the controller
    /// keeps retrying on its own after transient drops; `Failed` always
    /// requires a fresh `connect()`.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        if self.is_connecting.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyConnecting);
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_connecting.store(false, Ordering::Relaxed);
        });

        if self.is_connected() {
            return Ok(());
        }

        self.expected_disconnect.store(false, Ordering::SeqCst);
        self.is_running.store(true, Ordering::SeqCst);
        *self.last_error.lock().await = None;
        self.handle.lock().await.retry = None;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state_rx = self.state_tx.subscribe();

        let controller = self.clone();
        tokio::spawn(async move { controller.run(generation).await });

        loop {
            if state_rx.changed().await.is_err() {
                return Err(SessionError::Disposed);
            }
            let state = *state_rx.borrow_and_update();
            match state {
                SessionState::Connected => return Ok(()),
                SessionState::Failed | SessionState::Disconnected => {
                    let err = self.last_error.lock().await.take();
                    return Err(err.unwrap_or(SessionError::NotConnected));
                }
                // Disposed mid-connect.
                SessionState::Idle => return Err(SessionError::Disposed),
                _ => {}
            }
        }
    }

    /// Caller-initiated disconnect: cancels any pending reconnection and
    /// suspends until teardown is confirmed.
    pub async fn disconnect(&self) {
        info!(target: "Session", "[{}] disconnecting", self.config.session_id);
        self.expected_disconnect.store(true, Ordering::SeqCst);
        self.is_running.store(false, Ordering::SeqCst);
        self.shutdown_notifier.notify_waiters();

        if let Some(transport) = self.current_transport().await {
            transport.disconnect().await;
        }

        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() || state == SessionState::Idle {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Tears everything down and returns the handle to `Idle`. Stale timer
    /// or transport callbacks from before disposal see a bumped generation
    /// and never mutate state again.
    pub async fn dispose(&self) {
        info!(target: "Session", "[{}] disposing", self.config.session_id);
        self.expected_disconnect.store(true, Ordering::SeqCst);
        self.is_running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.shutdown_notifier.notify_waiters();

        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
        {
            let mut handle = self.handle.lock().await;
            handle.retry = None;
            handle.credential = None;
        }
        self.set_state(SessionState::Idle, None);
    }

    /// Sends an outbound payload on the live connection.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let transport = self
            .current_transport()
            .await
            .ok_or(SessionError::NotConnected)?;
        transport
            .send(payload)
            .await
            .map_err(|e| SessionError::Transport {
                code: 0,
                message: e.to_string(),
            })
    }

    /// Used by specializations whose preconditions fail before any
    /// transport work happens (e.g. a denied device capability).
    pub(crate) async fn fail_without_connect(&self, err: SessionError) {
        error!(target: "Session", "[{}] {err}", self.config.session_id);
        self.publish_error(&err);
        *self.last_error.lock().await = Some(err);
        self.set_state(SessionState::Failed, None);
    }

    fn set_state(&self, state: SessionState, reason: Option<DisconnectReason>) {
        if *self.state_tx.borrow() == state {
            return;
        }
        debug!(target: "Session", "[{}] state -> {state}", self.config.session_id);
        self.state_tx.send_replace(state);
        let _ = self
            .event_bus
            .state
            .send(Arc::new(StateChanged { state, reason }));
    }

    /// Generation-guarded state change; stale tasks become no-ops here.
    fn transition(
        &self,
        generation: u64,
        state: SessionState,
        reason: Option<DisconnectReason>,
    ) -> bool {
        if !self.is_current(generation) {
            debug!(
                target: "Session",
                "[{}] dropping stale transition to {state}",
                self.config.session_id
            );
            return false;
        }
        self.set_state(state, reason);
        true
    }

    fn publish_error(&self, err: &SessionError) {
        let code = match err {
            SessionError::Transport { code, .. } => *code,
            _ => 0,
        };
        let _ = self.event_bus.error.send(Arc::new(ErrorEvent {
            kind: err.kind(),
            code,
            message: err.to_string(),
        }));
    }

    async fn run(self: Arc<Self>, generation: u64) {
        while self.is_running.load(Ordering::Relaxed) && self.is_current(generation) {
            self.transition(generation, SessionState::Connecting, None);

            let established = tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    self.transition(generation, SessionState::Disconnected, None);
                    return;
                }
                result = self.establish() => result,
            };

            let outcome = match established {
                Ok((transport, events)) => {
                    self.on_connected(generation, &transport).await;
                    let outcome = self.pump_events(events, generation).await;
                    self.teardown_connection(&transport).await;
                    outcome
                }
                Err(err) => {
                    if !err.is_retryable() {
                        self.fail(generation, err).await;
                        return;
                    }
                    warn!(
                        target: "Session",
                        "[{}] connect attempt failed: {err}",
                        self.config.session_id
                    );
                    self.publish_error(&err);
                    *self.last_error.lock().await = Some(err);
                    ConnectionOutcome::AttemptFailed
                }
            };

            let reason = match outcome {
                ConnectionOutcome::Superseded => return,
                ConnectionOutcome::Expected => {
                    self.transition(generation, SessionState::Disconnected, None);
                    return;
                }
                ConnectionOutcome::Lost(reason) => Some(reason),
                ConnectionOutcome::AttemptFailed => None,
            };

            if self.expected_disconnect.load(Ordering::Relaxed)
                || !self.is_running.load(Ordering::Relaxed)
            {
                self.transition(generation, SessionState::Disconnected, reason);
                return;
            }

            if !self.config.auto_reconnect {
                // Without auto-reconnect a failed attempt is a terminal
                // failure; a drop after being connected is a plain
                // disconnect.
                match reason {
                    Some(reason) => {
                        self.transition(generation, SessionState::Disconnected, Some(reason));
                    }
                    None => {
                        self.transition(generation, SessionState::Failed, None);
                    }
                }
                return;
            }

            let next = {
                let mut handle = self.handle.lock().await;
                let attempt = handle.retry.as_ref().map(|r| r.attempt).unwrap_or(0) + 1;
                if self.config.backoff.is_exhausted(attempt) {
                    handle.retry = None;
                    None
                } else {
                    let retry = RetryState::new(attempt, &self.config.backoff);
                    let delay = retry.next_delay;
                    handle.retry = Some(retry);
                    Some((attempt, delay))
                }
            };
            let Some((attempt, delay)) = next else {
                self.fail(generation, SessionError::RetriesExhausted).await;
                return;
            };

            self.transition(generation, SessionState::Reconnecting, reason);
            info!(
                target: "Session",
                "[{}] will reconnect in {delay:?} (attempt {attempt})",
                self.config.session_id
            );
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    self.transition(generation, SessionState::Disconnected, None);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One bounded connection attempt: credential fetch and transport
    /// creation together must finish within `connect_timeout`.
    async fn establish(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), SessionError> {
        tokio::time::timeout(self.config.connect_timeout, self.open_connection())
            .await
            .map_err(|_| SessionError::Timeout(self.config.connect_timeout))?
    }

    async fn open_connection(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), SessionError> {
        let ctx = SessionContext {
            session_id: self.config.session_id.clone(),
        };
        let credential = self
            .credentials
            .get_credential(&ctx)
            .await
            .map_err(|e| SessionError::Credential(e.to_string()))?;
        if credential.is_expired() {
            return Err(SessionError::Credential(
                "provider returned an expired credential".into(),
            ));
        }

        // A new connect supersedes any prior connection for this handle.
        if let Some(old) = self.transport.lock().await.take() {
            debug!(
                target: "Session",
                "[{}] superseding previous transport",
                self.config.session_id
            );
            old.disconnect().await;
        }

        let (transport, events) = self
            .transport_factory
            .create_transport(&credential)
            .await
            .map_err(|e| SessionError::Transport {
                code: 0,
                message: e.to_string(),
            })?;

        self.handle.lock().await.credential = Some(credential);
        *self.transport.lock().await = Some(transport.clone());
        Ok((transport, events))
    }

    async fn on_connected(self: &Arc<Self>, generation: u64, transport: &Arc<dyn Transport>) {
        {
            let mut handle = self.handle.lock().await;
            handle.retry = None;
            handle.last_connected_at = Some(Utc::now());
        }
        info!(target: "Session", "[{}] connected", self.config.session_id);
        self.transition(generation, SessionState::Connected, None);

        // The keepalive loop is bound to this connection's transport; a
        // loop left over from a previous connection exits once the current
        // transport no longer matches its own.
        let controller = self.clone();
        let transport = transport.clone();
        tokio::spawn(async move { controller.keepalive_loop(generation, transport).await });
    }

    async fn pump_events(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
        generation: u64,
    ) -> ConnectionOutcome {
        let mut refresh = {
            let handle = self.handle.lock().await;
            match handle.credential.as_ref() {
                Some(credential) => RefreshSchedule::for_credential(
                    credential,
                    self.config.credential_refresh_lead,
                ),
                None => RefreshSchedule::disarmed(),
            }
        };

        loop {
            if !self.is_current(generation) {
                return ConnectionOutcome::Superseded;
            }
            if !self.is_running.load(Ordering::Relaxed) {
                return ConnectionOutcome::Expected;
            }

            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    return ConnectionOutcome::Expected;
                }
                _ = tokio::time::sleep_until(refresh.renew_at.unwrap_or_else(far_future)),
                    if refresh.renew_at.is_some() =>
                {
                    self.renew_credential(&mut refresh).await;
                }
                _ = tokio::time::sleep_until(refresh.force_at.unwrap_or_else(far_future)),
                    if refresh.force_at.is_some() =>
                {
                    warn!(
                        target: "Session",
                        "[{}] credential expired without renewal, recycling connection",
                        self.config.session_id
                    );
                    return ConnectionOutcome::Lost(DisconnectReason::Other(
                        "credential expired".into(),
                    ));
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(outcome) =
                            self.handle_transport_event(event, &mut refresh).await
                        {
                            return outcome;
                        }
                    }
                    None => {
                        return if self.expected_disconnect.load(Ordering::Relaxed) {
                            ConnectionOutcome::Expected
                        } else {
                            info!(
                                target: "Session",
                                "[{}] transport event channel closed",
                                self.config.session_id
                            );
                            ConnectionOutcome::Lost(DisconnectReason::NetworkLost)
                        };
                    }
                }
            }
        }
    }

    async fn handle_transport_event(
        &self,
        event: TransportEvent,
        refresh: &mut RefreshSchedule,
    ) -> Option<ConnectionOutcome> {
        self.handle.lock().await.last_event_at = Some(Utc::now());

        match event {
            TransportEvent::Connected => {
                // Already implied by create_transport succeeding.
                debug!(target: "Session", "[{}] transport connected event", self.config.session_id);
                None
            }
            TransportEvent::Message(payload) => {
                let _ = self
                    .event_bus
                    .message
                    .send(Arc::new(MessageReceived { payload }));
                None
            }
            TransportEvent::Quality(level) => {
                let _ = self
                    .event_bus
                    .quality
                    .send(Arc::new(QualityChanged { level }));
                None
            }
            TransportEvent::ParticipantJoined { id } => {
                let _ = self
                    .event_bus
                    .participant_joined
                    .send(Arc::new(ParticipantJoined { id }));
                None
            }
            TransportEvent::ParticipantLeft { id, reason } => {
                let _ = self
                    .event_bus
                    .participant_left
                    .send(Arc::new(ParticipantLeft { id, reason }));
                None
            }
            TransportEvent::CredentialExpiringSoon => {
                info!(
                    target: "Session",
                    "[{}] transport signalled credential expiring soon",
                    self.config.session_id
                );
                self.renew_credential(refresh).await;
                None
            }
            TransportEvent::Error { code, message } => {
                let err = SessionError::Transport { code, message };
                warn!(target: "Session", "[{}] {err}", self.config.session_id);
                self.publish_error(&err);
                let reason = DisconnectReason::Other(format!("transport error {code}"));
                *self.last_error.lock().await = Some(err);
                Some(ConnectionOutcome::Lost(reason))
            }
            TransportEvent::Disconnected(reason) => {
                if self.expected_disconnect.load(Ordering::Relaxed) {
                    info!(
                        target: "Session",
                        "[{}] transport disconnected as expected",
                        self.config.session_id
                    );
                    Some(ConnectionOutcome::Expected)
                } else {
                    info!(
                        target: "Session",
                        "[{}] transport disconnected unexpectedly: {reason}",
                        self.config.session_id
                    );
                    Some(ConnectionOutcome::Lost(reason))
                }
            }
        }
    }

    async fn renew_credential(&self, refresh: &mut RefreshSchedule) {
        let ctx = SessionContext {
            session_id: self.config.session_id.clone(),
        };
        let new_credential = match self.credentials.get_credential(&ctx).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    target: "Session",
                    "[{}] could not obtain replacement credential: {e}",
                    self.config.session_id
                );
                let _ = self.event_bus.error.send(Arc::new(ErrorEvent {
                    kind: ErrorKind::Credential,
                    code: 0,
                    message: e.to_string(),
                }));
                refresh.renew_at = None;
                return;
            }
        };

        let Some(transport) = self.current_transport().await else {
            refresh.renew_at = None;
            return;
        };

        match transport.renew(&new_credential.token).await {
            Ok(()) => {
                info!(
                    target: "Session",
                    "[{}] credential renewed, next expiry {}",
                    self.config.session_id, new_credential.expires_at
                );
                *refresh = RefreshSchedule::for_credential(
                    &new_credential,
                    self.config.credential_refresh_lead,
                );
                self.handle.lock().await.credential = Some(new_credential);
            }
            Err(e) => {
                // Not fatal: if the connection is actually dying, the
                // transport's own failure signal routes through the
                // reconnect path. The force timer recycles the connection
                // at expiry otherwise.
                warn!(
                    target: "Session",
                    "[{}] credential renewal on live transport failed: {e}",
                    self.config.session_id
                );
                refresh.renew_at = None;
            }
        }
    }

    async fn teardown_connection(&self, transport: &Arc<dyn Transport>) {
        transport.disconnect().await;
        let mut guard = self.transport.lock().await;
        if let Some(current) = guard.as_ref()
            && Arc::ptr_eq(current, transport)
        {
            *guard = None;
        }
        drop(guard);
        self.handle.lock().await.credential = None;
    }

    async fn fail(&self, generation: u64, err: SessionError) {
        if !self.is_current(generation) {
            return;
        }
        error!(target: "Session", "[{}] {err}", self.config.session_id);
        self.publish_error(&err);
        *self.last_error.lock().await = Some(err);
        self.handle.lock().await.retry = None;
        self.set_state(SessionState::Failed, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionState::Disconnected.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Reconnecting.is_terminal());
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::new("chat-1");
        assert_eq!(config.session_id, "chat-1");
        assert!(config.auto_reconnect);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.credential_refresh_lead, Duration::from_secs(30));
        assert_eq!(config.backoff.max_attempts, 5);
    }

    #[test]
    fn short_credentials_renew_at_half_life() {
        let credential = Credential {
            token: "t".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(10),
            channel: "c".into(),
            participant_id: "p".into(),
        };
        let schedule = RefreshSchedule::for_credential(&credential, Duration::from_secs(30));
        let renew_at = schedule.renew_at.unwrap();
        let force_at = schedule.force_at.unwrap();
        assert!(renew_at < force_at);
        assert!(renew_at <= Instant::now() + Duration::from_secs(5));
    }
}
