//! Transport adapter seam.
//!
//! The transport is the external capability that actually moves bytes or
//! media (socket library, media-engine SDK). The controller never reaches
//! around it: connecting means asking the [`TransportFactory`] for a new
//! instance, and everything the connection reports comes back as
//! [`TransportEvent`]s on the channel returned alongside it.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::credential::Credential;

/// An event raised by the transport layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport has successfully connected.
    Connected,
    /// The connection was lost or closed.
    Disconnected(DisconnectReason),
    /// The transport hit an error it could not recover from.
    Error { code: i32, message: String },
    /// An inbound message payload arrived.
    Message(Bytes),
    /// A remote participant joined the channel.
    ParticipantJoined { id: String },
    /// A remote participant left the channel.
    ParticipantLeft { id: String, reason: String },
    /// Link quality estimate changed.
    Quality(QualityLevel),
    /// The credential backing the connection is about to expire.
    CredentialExpiringSoon,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ClosedByPeer,
    NetworkLost,
    /// Replaced by a newer connection for the same session.
    Superseded,
    Other(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClosedByPeer => f.write_str("closed by peer"),
            Self::NetworkLost => f.write_str("network lost"),
            Self::Superseded => f.write_str("superseded"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Bad,
    Poor,
    Good,
    Excellent,
}

/// Represents an active connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends an outbound payload.
    async fn send(&self, payload: &[u8]) -> Result<(), anyhow::Error>;

    /// Protocol-level no-op used by the keepalive loop to detect silent
    /// connection death.
    async fn ping(&self) -> Result<(), anyhow::Error>;

    /// Updates the live connection's credential without a
    /// disconnect/reconnect cycle.
    async fn renew(&self, token: &str) -> Result<(), anyhow::Error>;

    /// Mutes or unmutes the local audio path.
    async fn set_muted(&self, muted: bool) -> Result<(), anyhow::Error>;

    /// Routes audio to the loudspeaker or back to the earpiece.
    async fn set_speaker(&self, enabled: bool) -> Result<(), anyhow::Error>;

    /// Closes the connection.
    async fn disconnect(&self);
}

/// A factory responsible for creating new transport instances.
///
/// Creating the transport *is* the connect. The factory may be shared across
/// sessions and is re-invoked for every attempt; it must not reuse state
/// from a prior connection.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_transport(
        &self,
        credential: &Credential,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error>;
}

pub mod mock {
    //! Scripted transport double for tests.
    //!
    //! Each queued [`ScriptedAttempt`] governs one `create_transport` call;
    //! an empty script means attempts succeed with no initial events. All
    //! primitive calls are recorded so tests can assert on them, and
    //! [`MockTransportFactory::latest_event_sender`] lets tests inject
    //! events into the live connection after the fact.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// One scripted `create_transport` outcome.
    pub enum ScriptedAttempt {
        /// Fail the connect outright.
        FailConnect(String),
        /// Never resolve, so the controller's connect timeout fires.
        Hang,
        /// Succeed and immediately emit the given events.
        Connect { events: Vec<TransportEvent> },
    }

    /// Calls recorded across every transport the factory produced.
    #[derive(Debug, Default)]
    pub struct RecordedCalls {
        pub sent: Vec<Vec<u8>>,
        pub pings: u32,
        pub renewals: Vec<String>,
        pub mutes: Vec<bool>,
        pub speakers: Vec<bool>,
        pub disconnects: u32,
    }

    pub struct MockTransport {
        calls: Arc<Mutex<RecordedCalls>>,
        fail_renew: Arc<AtomicBool>,
        fail_ping: Arc<AtomicBool>,
        event_tx: mpsc::Sender<TransportEvent>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, payload: &[u8]) -> Result<(), anyhow::Error> {
            self.calls.lock().unwrap().sent.push(payload.to_vec());
            Ok(())
        }

        async fn ping(&self) -> Result<(), anyhow::Error> {
            self.calls.lock().unwrap().pings += 1;
            if self.fail_ping.load(Ordering::SeqCst) {
                anyhow::bail!("ping lost");
            }
            Ok(())
        }

        async fn renew(&self, token: &str) -> Result<(), anyhow::Error> {
            self.calls.lock().unwrap().renewals.push(token.to_string());
            if self.fail_renew.load(Ordering::SeqCst) {
                anyhow::bail!("renew rejected");
            }
            Ok(())
        }

        async fn set_muted(&self, muted: bool) -> Result<(), anyhow::Error> {
            self.calls.lock().unwrap().mutes.push(muted);
            Ok(())
        }

        async fn set_speaker(&self, enabled: bool) -> Result<(), anyhow::Error> {
            self.calls.lock().unwrap().speakers.push(enabled);
            Ok(())
        }

        async fn disconnect(&self) {
            self.calls.lock().unwrap().disconnects += 1;
            // A real adapter reports teardown through its event surface.
            let _ = self
                .event_tx
                .try_send(TransportEvent::Disconnected(DisconnectReason::ClosedByPeer));
        }
    }

    pub struct MockTransportFactory {
        script: Mutex<VecDeque<ScriptedAttempt>>,
        calls: Arc<Mutex<RecordedCalls>>,
        connect_count: AtomicU32,
        fail_renew: Arc<AtomicBool>,
        fail_ping: Arc<AtomicBool>,
        latest_event_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
        last_credential: Mutex<Option<Credential>>,
    }

    impl MockTransportFactory {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                calls: Arc::new(Mutex::new(RecordedCalls::default())),
                connect_count: AtomicU32::new(0),
                fail_renew: Arc::new(AtomicBool::new(false)),
                fail_ping: Arc::new(AtomicBool::new(false)),
                latest_event_tx: Mutex::new(None),
                last_credential: Mutex::new(None),
            })
        }

        pub fn script_attempt(&self, attempt: ScriptedAttempt) {
            self.script.lock().unwrap().push_back(attempt);
        }

        pub fn connect_count(&self) -> u32 {
            self.connect_count.load(Ordering::SeqCst)
        }

        pub fn set_fail_renew(&self, fail: bool) {
            self.fail_renew.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_ping(&self, fail: bool) {
            self.fail_ping.store(fail, Ordering::SeqCst);
        }

        /// Sender feeding the most recently created connection's event
        /// channel.
        pub fn latest_event_sender(&self) -> Option<mpsc::Sender<TransportEvent>> {
            self.latest_event_tx.lock().unwrap().clone()
        }

        /// Credential the most recent connection was opened with.
        pub fn last_credential(&self) -> Option<Credential> {
            self.last_credential.lock().unwrap().clone()
        }

        pub fn with_calls<R>(&self, f: impl FnOnce(&RecordedCalls) -> R) -> R {
            f(&self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
            credential: &Credential,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            *self.last_credential.lock().unwrap() = Some(credential.clone());

            let attempt = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ScriptedAttempt::Connect { events: Vec::new() });

            let events = match attempt {
                ScriptedAttempt::FailConnect(message) => anyhow::bail!(message),
                ScriptedAttempt::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                ScriptedAttempt::Connect { events } => events,
            };

            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            for event in events {
                let _ = tx.send(event).await;
            }
            *self.latest_event_tx.lock().unwrap() = Some(tx.clone());

            let transport = Arc::new(MockTransport {
                calls: self.calls.clone(),
                fail_renew: self.fail_renew.clone(),
                fail_ping: self.fail_ping.clone(),
                event_tx: tx,
            });
            Ok((transport, rx))
        }
    }
}
