//! Session lifecycle broadcast payloads.

use std::time::SystemTime;

use crate::orchestrator::types::{Difficulty, Topic};

/// Coarse phases a session passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecyclePhase {
    /// Devices probed and the greeting turn seeded.
    Started,
    /// The session loop stopped.
    TornDown,
}

/// Extra detail attached to a lifecycle update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLifecyclePayload {
    None,
    Started(StartedPayload),
    TornDown(SummaryPayload),
}

impl Default for SessionLifecyclePayload {
    fn default() -> Self {
        SessionLifecyclePayload::None
    }
}

/// Capabilities probed when the session started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedPayload {
    pub capture_available: bool,
    pub output_available: bool,
    /// Topic the history was seeded with.
    pub topic: Topic,
    pub difficulty: Difficulty,
}

/// Conversation totals reported at teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPayload {
    /// Every visible turn, greeting and apologies included.
    pub turns: usize,
    /// Exchanges whose reply made it into the history.
    pub completed_exchanges: usize,
}

/// Lifecycle event for one session.
#[derive(Debug, Clone)]
pub struct SessionLifecycleUpdate {
    pub session_id: String,
    pub phase: SessionLifecyclePhase,
    pub issued_at: SystemTime,
    pub payload: SessionLifecyclePayload,
}

impl SessionLifecycleUpdate {
    pub fn new<S: Into<String>>(session_id: S, phase: SessionLifecyclePhase) -> Self {
        Self {
            session_id: session_id.into(),
            phase,
            issued_at: SystemTime::now(),
            payload: SessionLifecyclePayload::None,
        }
    }

    /// Builds a `Started` update carrying the probed capabilities.
    pub fn started<S: Into<String>>(session_id: S, payload: StartedPayload) -> Self {
        Self {
            payload: SessionLifecyclePayload::Started(payload),
            ..Self::new(session_id, SessionLifecyclePhase::Started)
        }
    }

    pub fn torn_down<S: Into<String>>(
        session_id: S,
        turns: usize,
        completed_exchanges: usize,
    ) -> Self {
        Self {
            payload: SessionLifecyclePayload::TornDown(SummaryPayload {
                turns,
                completed_exchanges,
            }),
            ..Self::new(session_id, SessionLifecyclePhase::TornDown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_helper_sets_payload() {
        let update = SessionLifecycleUpdate::started(
            "session-1",
            StartedPayload {
                capture_available: false,
                output_available: true,
                topic: Topic::Travel,
                difficulty: Difficulty::Beginner,
            },
        );

        assert_eq!(update.phase, SessionLifecyclePhase::Started);
        match update.payload {
            SessionLifecyclePayload::Started(payload) => {
                assert!(!payload.capture_available);
                assert!(payload.output_available);
                assert_eq!(payload.topic, Topic::Travel);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn torn_down_helper_wraps_summary() {
        let update = SessionLifecycleUpdate::torn_down("session-1", 5, 2);

        assert_eq!(update.session_id, "session-1");
        assert_eq!(
            update.payload,
            SessionLifecyclePayload::TornDown(SummaryPayload {
                turns: 5,
                completed_exchanges: 2,
            })
        );
    }
}
