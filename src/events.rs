//! Normalized session events and the in-process event bus.
//!
//! One bounded broadcast channel per event kind. Every subscriber for a
//! kind receives every event of that kind in publish order, exactly once;
//! there is no ordering guarantee across subscribers. Slow subscribers do
//! not block publishers: once a subscriber's buffer overflows, the oldest
//! events are dropped and [`EventStream::recv`] logs a warning before
//! continuing with what is left.

use bytes::Bytes;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::session::SessionState;
use crate::transport::{DisconnectReason, QualityLevel};

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The session moved to a new connection state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StateChanged {
    pub state: SessionState,
    /// Set when the transition was caused by a connection loss.
    pub reason: Option<DisconnectReason>,
}

/// An inbound message payload arrived.
#[derive(Debug, Clone)]
pub struct MessageReceived {
    pub payload: Bytes,
}

/// An error surfaced by the session. Retryable kinds are informational;
/// the session keeps handling them on its own.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ParticipantJoined {
    pub id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ParticipantLeft {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QualityChanged {
    pub level: QualityLevel,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MuteChanged {
    pub muted: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SpeakerChanged {
    pub enabled: bool,
}

/// Periodic elapsed-time tick while a call is connected.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DurationTick {
    pub elapsed: Duration,
}

/// Subscription handle for one event kind. Dropping it unsubscribes;
/// in-flight delivery to other subscribers is unaffected.
pub struct EventStream<T> {
    rx: broadcast::Receiver<T>,
    channel: &'static str,
}

impl<T: Clone> EventStream<T> {
    fn new(rx: broadcast::Receiver<T>, channel: &'static str) -> Self {
        Self { rx, channel }
    }

    /// Receives the next event. Events dropped because this subscriber
    /// lagged behind are logged and skipped; returns `None` once the bus is
    /// gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        target: "EventBus",
                        "subscriber lagged on '{}', dropped {n} event(s)",
                        self.channel
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// Macro to generate EventBus fields, constructor, and typed subscribe methods.
macro_rules! define_event_bus {
    ($(($field:ident, $subscribe:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event kind.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }

            $(
                pub fn $subscribe(&self) -> EventStream<$type> {
                    EventStream::new(self.$field.subscribe(), stringify!($field))
                }
            )*
        }
    };
}

define_event_bus! {
    // Connection events
    (state, subscribe_state, Arc<StateChanged>),
    (message, subscribe_message, Arc<MessageReceived>),
    (error, subscribe_error, Arc<ErrorEvent>),

    // Call events
    (participant_joined, subscribe_participant_joined, Arc<ParticipantJoined>),
    (participant_left, subscribe_participant_left, Arc<ParticipantLeft>),
    (quality, subscribe_quality, Arc<QualityChanged>),
    (mute, subscribe_mute, Arc<MuteChanged>),
    (speaker, subscribe_speaker, Arc<SpeakerChanged>),
    (duration, subscribe_duration, Arc<DurationTick>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
