//! Call session: a specialization of the session controller for realtime
//! audio calls.
//!
//! On top of the generic connection machinery this adds:
//!
//! - device capability gating before any transport work happens
//! - single-remote participant tracking (a second join never replaces the
//!   tracked participant)
//! - mute / speaker toggles forwarded to the transport without touching the
//!   connection state machine
//! - a duration clock that ticks while the call is connected, recomputed
//!   from a captured start instant rather than incremented
//!
//! The remote participant leaving ends the call through the normal
//! disconnect path, distinct from a network-level disconnect.

mod state;

pub use state::CallState;
pub(crate) use state::CallInner;

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::credential::CredentialProvider;
use crate::error::SessionError;
use crate::events::{
    DurationTick, EventBus, EventStream, MuteChanged, ParticipantJoined, ParticipantLeft,
    QualityChanged, SpeakerChanged,
};
use crate::session::{SessionConfig, SessionController, SessionState};
use crate::transport::TransportFactory;

const DEFAULT_DURATION_TICK: Duration = Duration::from_secs(1);

/// Device capabilities a call may need granted before it can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Microphone,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

/// External collaborator that grants device capabilities.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Requests a capability grant; `Ok(false)` means the user denied it.
    async fn request(&self, capability: Capability) -> Result<bool, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct CallConfig {
    pub session: SessionConfig,
    /// Period of the duration clock while connected.
    pub duration_tick: Duration,
}

impl CallConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session: SessionConfig::new(session_id),
            duration_tick: DEFAULT_DURATION_TICK,
        }
    }
}

/// Bus subscriptions taken out before the session connects, so the watcher
/// sees every call event from the very first connection.
struct CallSubscriptions {
    state_rx: tokio::sync::watch::Receiver<SessionState>,
    joined: EventStream<Arc<ParticipantJoined>>,
    left: EventStream<Arc<ParticipantLeft>>,
    quality: EventStream<Arc<QualityChanged>>,
}

/// Orchestrates one audio call session.
pub struct CallSessionController {
    session: Arc<SessionController>,
    permissions: Arc<dyn PermissionProvider>,
    duration_tick: Duration,
    inner: Mutex<CallInner>,
}

impl CallSessionController {
    pub fn new(
        config: CallConfig,
        credentials: Arc<dyn CredentialProvider>,
        transport_factory: Arc<dyn TransportFactory>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Arc<Self> {
        let session = SessionController::new(config.session, credentials, transport_factory);
        Arc::new(Self {
            session,
            permissions,
            duration_tick: config.duration_tick,
            inner: Mutex::new(CallInner::default()),
        })
    }

    /// The underlying session controller; exposes connection state and the
    /// event bus streams.
    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.session.event_bus
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub async fn call_state(&self) -> CallState {
        self.inner.lock().await.snapshot()
    }

    /// Elapsed call time while connected, recomputed from the captured
    /// start instant.
    pub async fn elapsed(&self) -> Option<Duration> {
        self.inner.lock().await.started.map(|s| s.elapsed())
    }

    /// Joins the call: requests the microphone grant, then drives the
    /// normal connect path. A denied grant fails the session immediately
    /// without any transport work.
    pub async fn join_call(self: &Arc<Self>) -> Result<(), SessionError> {
        let granted = self
            .permissions
            .request(Capability::Microphone)
            .await
            .map_err(|e| SessionError::Permission(e.to_string()))?;
        if !granted {
            let message = format!("{} access denied", Capability::Microphone);
            self.session
                .fail_without_connect(SessionError::Permission(message.clone()))
                .await;
            return Err(SessionError::Permission(message));
        }

        *self.inner.lock().await = CallInner::default();

        // Subscribe before connecting so no call events are missed.
        let subscriptions = CallSubscriptions {
            state_rx: self.session.watch_state(),
            joined: self.event_bus().subscribe_participant_joined(),
            left: self.event_bus().subscribe_participant_left(),
            quality: self.event_bus().subscribe_quality(),
        };
        let watcher = self.clone();
        tokio::spawn(async move { watcher.watch_session(subscriptions).await });

        self.session.connect().await
    }

    /// Ends the call through the normal disconnect path.
    pub async fn leave_call(&self) {
        info!(target: "Call", "[{}] leaving call", self.session.session_id());
        self.session.disconnect().await;
    }

    pub async fn dispose(&self) {
        self.session.dispose().await;
    }

    /// Flips the mute state; local state only changes once the transport
    /// accepts the toggle. Returns the new state.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        let next = !self.inner.lock().await.muted;
        let transport = self
            .session
            .current_transport()
            .await
            .ok_or(SessionError::NotConnected)?;
        transport
            .set_muted(next)
            .await
            .map_err(|e| SessionError::Transport {
                code: 0,
                message: e.to_string(),
            })?;
        self.inner.lock().await.muted = next;
        let _ = self
            .event_bus()
            .mute
            .send(Arc::new(MuteChanged { muted: next }));
        Ok(next)
    }

    pub async fn set_speaker(&self, enabled: bool) -> Result<(), SessionError> {
        let transport = self
            .session
            .current_transport()
            .await
            .ok_or(SessionError::NotConnected)?;
        transport
            .set_speaker(enabled)
            .await
            .map_err(|e| SessionError::Transport {
                code: 0,
                message: e.to_string(),
            })?;
        self.inner.lock().await.speaker_on = enabled;
        let _ = self
            .event_bus()
            .speaker
            .send(Arc::new(SpeakerChanged { enabled }));
        Ok(())
    }

    /// Consumes the session's normalized events and maintains call-local
    /// state. Runs for the lifetime of one call, across reconnect cycles,
    /// and exits when the session reaches a terminal state.
    async fn watch_session(self: Arc<Self>, subscriptions: CallSubscriptions) {
        let CallSubscriptions {
            mut state_rx,
            mut joined,
            mut left,
            mut quality,
        } = subscriptions;
        let bus = self.event_bus().clone();
        let mut ticker = tokio::time::interval(self.duration_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = *state_rx.borrow_and_update();
                    match state {
                        SessionState::Connected => {
                            self.inner.lock().await.clock_started();
                        }
                        SessionState::Disconnected
                        | SessionState::Failed
                        | SessionState::Idle => {
                            self.inner.lock().await.clock_stopped();
                            debug!(
                                target: "Call",
                                "[{}] session reached {state}, call watcher exiting",
                                self.session.session_id()
                            );
                            return;
                        }
                        _ => {
                            self.inner.lock().await.clock_stopped();
                        }
                    }
                }
                event = joined.recv() => {
                    let Some(event) = event else { return };
                    self.on_participant_joined(&event.id).await;
                }
                event = left.recv() => {
                    let Some(event) = event else { return };
                    if self.on_participant_left(&event.id).await {
                        info!(
                            target: "Call",
                            "[{}] remote participant left ({}), ending call",
                            self.session.session_id(),
                            event.reason
                        );
                        self.session.disconnect().await;
                        self.inner.lock().await.clock_stopped();
                        return;
                    }
                }
                event = quality.recv() => {
                    let Some(event) = event else { return };
                    self.inner.lock().await.quality = Some(event.level);
                }
                _ = ticker.tick() => {
                    let started = self.inner.lock().await.started;
                    if let Some(started) = started {
                        let _ = bus.duration.send(Arc::new(DurationTick {
                            elapsed: started.elapsed(),
                        }));
                    }
                }
            }
        }
    }

    async fn on_participant_joined(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        match inner.remote_participant.as_deref() {
            None => {
                info!(
                    target: "Call",
                    "[{}] remote participant {id} joined",
                    self.session.session_id()
                );
                inner.remote_participant = Some(id.to_string());
            }
            Some(existing) if existing == id => {
                debug!(
                    target: "Call",
                    "[{}] duplicate join from {id}",
                    self.session.session_id()
                );
            }
            Some(existing) => {
                // Single-remote sessions: the tracked participant is never
                // replaced by a later join.
                warn!(
                    target: "Call",
                    "[{}] ignoring join from {id}, already tracking {existing}",
                    self.session.session_id()
                );
            }
        }
    }

    /// Returns true when the tracked remote participant left and the call
    /// should end.
    async fn on_participant_left(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.remote_participant.as_deref() {
            Some(tracked) if tracked == id => {
                inner.remote_participant = None;
                true
            }
            _ => {
                warn!(
                    target: "Call",
                    "[{}] dropping leave for untracked participant {id}",
                    self.session.session_id()
                );
                false
            }
        }
    }
}
