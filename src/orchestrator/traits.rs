use async_trait::async_trait;

use crate::orchestrator::error::ResponderError;
use crate::orchestrator::types::{Difficulty, Topic};
use crate::session::history::HistoryEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderRequest {
    pub user_text: String,
    /// History as it stood before `user_text`.
    pub history: Vec<HistoryEntry>,
    pub difficulty: Difficulty,
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderReply {
    pub reply_text: String,
    /// Expected to be `history` + user entry + assistant entry.
    pub new_history: Vec<HistoryEntry>,
}

impl ResponderReply {
    /// Builds the reply a well-behaved responder returns for `request`.
    pub fn extending(request: &ResponderRequest, reply_text: String) -> Self {
        let mut new_history = request.history.clone();
        new_history.push(HistoryEntry::user(request.user_text.clone()));
        new_history.push(HistoryEntry::assistant(reply_text.clone()));
        Self {
            reply_text,
            new_history,
        }
    }
}

/// Produces the tutor's reply to one learner utterance. No timeout is imposed
/// by the caller.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError>;

    fn name(&self) -> &'static str;
}
