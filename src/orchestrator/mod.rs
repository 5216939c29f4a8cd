//! Turn-taking orchestration for a spoken tutoring conversation.

mod constants;
pub mod engine;

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ChatConfig, LogConfig, ResponderKind, TutorConfig};
pub use engine::TurnOrchestrator;
pub use error::{ResponderError, SessionError};
pub use traits::{Responder, ResponderReply, ResponderRequest};
pub use types::{
    Capability, Difficulty, NoticeLevel, RetryRejection, SessionNotice, SessionSnapshot,
    SessionUpdate, Topic, TurnState,
};

#[cfg(test)]
pub(crate) mod tests;
