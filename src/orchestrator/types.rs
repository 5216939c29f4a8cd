use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::oneshot;

use crate::orchestrator::error::{ResponderError, SessionError};
use crate::orchestrator::traits::ResponderReply;
use crate::session::history::HistoryEntry;
use crate::session::turn::Turn;
use crate::speech::capture::CaptureState;
use crate::speech::output::OutputState;
use crate::speech::types::{SpeechEvent, UtteranceId};

/// Conversation scenario the tutor steers toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    #[default]
    General,
    Travel,
    Restaurant,
    Shopping,
    Emergency,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::General,
        Topic::Travel,
        Topic::Restaurant,
        Topic::Shopping,
        Topic::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::General => "general",
            Topic::Travel => "travel",
            Topic::Restaurant => "restaurant",
            Topic::Shopping => "shopping",
            Topic::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant::new("topic", value))
    }
}

/// Learner level; shapes the system prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant::new("difficulty", value))
    }
}

/// A topic or difficulty name that matched nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Turn-taking phase of a session. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Nothing in flight; waiting on the learner.
    #[default]
    Idle,
    /// The microphone is open and a transcript is accumulating.
    Listening,
    /// A responder call is outstanding.
    AwaitingResponse,
    /// The tutor's reply is being played.
    Speaking,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::AwaitingResponse => "awaiting_response",
            TurnState::Speaking => "speaking",
        }
    }
}

/// Media half of the session that may be missing on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Capture,
    Output,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Capture => "capture",
            Capability::Output => "output",
        }
    }
}

/// Why a `retry_turn` target was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRejection {
    UnknownTurn,
    NotAiTurn,
    /// The greeting has no learner turn to answer.
    FirstTurn,
    NoPrecedingUserTurn,
}

impl fmt::Display for RetryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RetryRejection::UnknownTurn => "no such turn",
            RetryRejection::NotAiTurn => "turn was not authored by the tutor",
            RetryRejection::FirstTurn => "the opening turn cannot be retried",
            RetryRejection::NoPrecedingUserTurn => "turn does not answer a learner turn",
        };
        f.write_str(text)
    }
}

/// One-shot answer to a `SessionCommand`.
pub type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Caller intents, each answered on its own reply channel.
#[derive(Debug)]
pub enum SessionCommand {
    ToggleListening(Reply<TurnState>),
    SendText(String, Reply<()>),
    Skip(Reply<()>),
    RetryLastSpeech(Reply<()>),
    RetryTurn(String, Reply<()>),
    SetAutoListen(bool, Reply<()>),
    SetTopic(Topic, Reply<()>),
    SetDifficulty(Difficulty, Reply<()>),
    ClearError(Reply<()>),
    Snapshot(Reply<SessionSnapshot>),
    Teardown(Reply<()>),
}

/// Everything the session loop reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    Command(SessionCommand),
    Speech(SpeechEvent),
    /// A responder task finished; stale `request` ids are ignored.
    ResponderFinished {
        request: u64,
        result: Result<ResponderReply, ResponderError>,
    },
    /// The post-speech listen delay elapsed for `token`.
    AutoListenDue {
        token: u64,
    },
}

/// Severity of a `SessionNotice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
}

/// Informational message for the learner; never changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotice {
    pub level: NoticeLevel,
    pub message: String,
}

impl SessionNotice {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }
}

/// Broadcast to observers of a session.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    StateChanged { from: TurnState, to: TurnState },
    /// Running transcript of the open capture, across restarts.
    TranscriptUpdated(String),
    TurnAppended(Turn),
    /// A retried tutor turn, same id with new text.
    TurnReplaced(Turn),
    SpeakingStarted(UtteranceId),
    SpeakingFinished,
    Notice(SessionNotice),
    /// User-visible error; the session stays usable.
    RecoverableError(String),
    ErrorCleared,
    /// A device was missing at start; that half is disabled.
    Unavailable(Capability),
}

/// Point-in-time copy of everything a caller can observe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: TurnState,
    pub turns: Vec<Turn>,
    pub history: Vec<HistoryEntry>,
    pub capture: CaptureState,
    pub output: OutputState,
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub auto_listen: bool,
    pub error: Option<String>,
    pub capture_available: bool,
    pub output_available: bool,
}
