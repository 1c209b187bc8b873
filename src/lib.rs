//! Resilient realtime session management.
//!
//! Two kinds of realtime sessions share one architectural pattern here: a
//! persistent bidirectional event connection (companion chat) and a
//! realtime audio call built on a media-transport engine. Both establish a
//! connection under an expiring credential, survive transient network loss
//! through automatic reconnection with backoff, refresh credentials
//! mid-session without tearing the session down, and fan normalized events
//! out to independent subscribers.
//!
//! The backend and the media engine are black boxes behind the
//! [`credential::CredentialProvider`] and [`transport::TransportFactory`]
//! seams; callers talk only to a [`session::SessionController`] (or its
//! call specialization) and observe the [`events::EventBus`] streams.
//!
//! Construct one controller per logical session and inject its
//! collaborators; there are no process-wide singletons.

pub mod backoff;
pub mod call;
pub mod credential;
pub mod error;
pub mod events;
mod keepalive;
pub mod session;
pub mod transport;

pub use backoff::{BackoffPolicy, RetryState};
pub use call::{CallConfig, CallSessionController, CallState, Capability, PermissionProvider};
pub use credential::{Credential, CredentialProvider, SessionContext};
pub use error::{ErrorKind, SessionError};
pub use events::{EventBus, EventStream};
pub use session::{SessionConfig, SessionController, SessionState};
pub use transport::{
    DisconnectReason, QualityLevel, Transport, TransportEvent, TransportFactory,
};
