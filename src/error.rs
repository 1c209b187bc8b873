//! Session error taxonomy.
//!
//! Retryable errors (`Transport`, `Timeout`) are contained by the session
//! controller and surfaced only as informational error events plus an
//! eventual `Failed` state once attempts are exhausted. `Credential` and
//! `Permission` errors require caller action and fail the session
//! immediately without consuming retry attempts.

use std::time::Duration;
use thiserror::Error;

/// Classification tag carried on published error events so callers can
/// route "needs re-authentication" differently from "still retrying".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Credential,
    Transport,
    Permission,
    Timeout,
    Protocol,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Credential => "credential",
            Self::Transport => "transport",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("transport error {code}: {message}")]
    Transport { code: i32, message: String },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("max reconnection attempts reached")]
    RetriesExhausted,

    #[error("session is not connected")]
    NotConnected,

    #[error("connect already in progress")]
    AlreadyConnecting,

    #[error("session has been disposed")]
    Disposed,
}

impl SessionError {
    /// Classifies the error for published events. Lifecycle variants
    /// (`RetriesExhausted`, `NotConnected`, `AlreadyConnecting`, `Disposed`)
    /// fold into the transport class: they report connection lifecycle
    /// outcomes, not a distinct failure source, and callers route on the
    /// concrete variant rather than the kind for those.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Credential(_) => ErrorKind::Credential,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Transport { .. }
            | Self::RetriesExhausted
            | Self::NotConnected
            | Self::AlreadyConnecting
            | Self::Disposed => ErrorKind::Transport,
        }
    }

    /// Whether the controller may retry this error via the backoff path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification() {
        assert_eq!(
            SessionError::Credential("expired refresh token".into()).kind(),
            ErrorKind::Credential
        );
        assert_eq!(
            SessionError::Transport {
                code: 503,
                message: "gateway unavailable".into()
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            SessionError::Permission("microphone".into()).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            SessionError::Timeout(Duration::from_secs(10)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            SessionError::Protocol("unexpected frame".into()).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn lifecycle_variants_fold_into_the_transport_class() {
        assert_eq!(SessionError::RetriesExhausted.kind(), ErrorKind::Transport);
        assert_eq!(SessionError::NotConnected.kind(), ErrorKind::Transport);
        assert_eq!(SessionError::AlreadyConnecting.kind(), ErrorKind::Transport);
        assert_eq!(SessionError::Disposed.kind(), ErrorKind::Transport);
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::Credential).unwrap(),
            r#""credential""#
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::Timeout).unwrap(),
            r#""timeout""#
        );
    }

    #[test]
    fn only_transport_and_timeout_are_retryable() {
        assert!(
            SessionError::Transport {
                code: 0,
                message: "reset".into()
            }
            .is_retryable()
        );
        assert!(SessionError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(!SessionError::Credential("nope".into()).is_retryable());
        assert!(!SessionError::Permission("mic".into()).is_retryable());
        assert!(!SessionError::RetriesExhausted.is_retryable());
    }
}
