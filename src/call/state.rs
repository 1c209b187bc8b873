//! Call-local state tracking.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::transport::QualityLevel;

/// Snapshot of call-local state, as exposed to callers. Mutated only by the
/// call session controller in response to transport events or explicit user
/// actions.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CallState {
    pub is_muted: bool,
    pub is_speaker_on: bool,
    /// The single tracked remote participant, if one has joined.
    pub remote_participant_id: Option<String>,
    pub connection_quality: Option<QualityLevel>,
    /// Wall-clock time the call reached `Connected`, while it is live.
    pub connected_at: Option<DateTime<Utc>>,
    /// Elapsed call time, recomputed from the captured start instant at
    /// snapshot time to avoid drift.
    pub elapsed: Duration,
}

/// Internal mutable call state. The monotonic start instant stays private
/// to the controller; snapshots derive `elapsed` from it.
#[derive(Debug, Default)]
pub(crate) struct CallInner {
    pub muted: bool,
    pub speaker_on: bool,
    pub remote_participant: Option<String>,
    pub quality: Option<QualityLevel>,
    pub connected_at: Option<DateTime<Utc>>,
    pub started: Option<Instant>,
}

impl CallInner {
    pub fn snapshot(&self) -> CallState {
        CallState {
            is_muted: self.muted,
            is_speaker_on: self.speaker_on,
            remote_participant_id: self.remote_participant.clone(),
            connection_quality: self.quality,
            connected_at: self.connected_at,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }

    /// Duration clock bookkeeping on entry to / exit from `Connected`.
    pub fn clock_started(&mut self) {
        self.connected_at = Some(Utc::now());
        self.started = Some(Instant::now());
    }

    pub fn clock_stopped(&mut self) {
        self.connected_at = None;
        self.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_clock() {
        let mut inner = CallInner::default();
        assert_eq!(inner.snapshot().elapsed, Duration::ZERO);
        assert!(inner.snapshot().connected_at.is_none());

        inner.clock_started();
        assert!(inner.snapshot().connected_at.is_some());

        inner.clock_stopped();
        let snap = inner.snapshot();
        assert_eq!(snap.elapsed, Duration::ZERO);
        assert!(snap.connected_at.is_none());
    }
}
