//! Responder-facing conversation history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entries present before the first exchange: system prompt and greeting.
pub const SEEDED_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history does not extend the current {expected} entries")]
    Diverged { expected: usize },
    #[error("expected one user and one assistant entry, got {added} new entries")]
    UnexpectedTail { added: usize },
}

/// Ordered log that only grows or shrinks at the tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistoryStore {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh conversation: `[system prompt, assistant greeting]`.
    pub fn seed<P: Into<String>, G: Into<String>>(&mut self, system_prompt: P, greeting: G) {
        self.entries.clear();
        self.entries.push(HistoryEntry::system(system_prompt));
        self.entries.push(HistoryEntry::assistant(greeting));
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Drops the most recent user/assistant pair and returns the remaining
    /// entries. `None` when there is no exchange to drop.
    pub fn rewind_last_exchange(&mut self) -> Option<Vec<HistoryEntry>> {
        self.last_exchange()?;
        let keep = self.entries.len() - 2;
        self.entries.truncate(keep);
        Some(self.entries.clone())
    }

    /// The trailing user/assistant pair, if the tail is one.
    pub fn last_exchange(&self) -> Option<&[HistoryEntry]> {
        if self.entries.len() < SEEDED_LEN + 2 {
            return None;
        }
        let tail = &self.entries[self.entries.len() - 2..];
        match (tail[0].role, tail[1].role) {
            (Role::User, Role::Assistant) => Some(tail),
            _ => None,
        }
    }

    /// Accepts a responder-returned history that extends the current one by
    /// exactly one user/assistant pair.
    pub fn adopt(&mut self, new_history: Vec<HistoryEntry>) -> Result<(), HistoryError> {
        let expected = self.entries.len();
        if new_history.len() < expected || new_history[..expected] != self.entries[..] {
            return Err(HistoryError::Diverged { expected });
        }

        let tail = &new_history[expected..];
        let pair = matches!(
            tail,
            [user, assistant] if user.role == Role::User && assistant.role == Role::Assistant
        );
        if !pair {
            return Err(HistoryError::UnexpectedTail { added: tail.len() });
        }

        self.entries.extend(new_history.into_iter().skip(expected));
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn completed_exchanges(&self) -> usize {
        self.entries.len().saturating_sub(SEEDED_LEN) / 2
    }
}
