//! Learner-visible conversation turns.

use serde::Serialize;
use std::time::SystemTime;

const MIN_AUDIO_SECONDS: u32 = 3;
const CHARS_PER_AUDIO_SECOND: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Text,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub created_at: SystemTime,
    pub kind: TurnKind,
    /// Display hint only.
    pub estimated_audio_seconds: Option<u32>,
}

impl Turn {
    pub fn is_ai(&self) -> bool {
        self.sender == Sender::Ai
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// Rough spoken length of `text` in whole seconds, never below three.
pub fn estimate_audio_seconds(text: &str) -> u32 {
    let seconds = text.chars().count() / CHARS_PER_AUDIO_SECOND;
    u32::try_from(seconds)
        .unwrap_or(u32::MAX)
        .max(MIN_AUDIO_SECONDS)
}

/// Insertion-ordered turn list with per-session ids.
#[derive(Debug, Clone, Default)]
pub struct TurnLog {
    turns: Vec<Turn>,
    next_id: u64,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user<S: Into<String>>(&mut self, text: S) -> &Turn {
        self.push(text.into(), Sender::User, TurnKind::Text, None)
    }

    pub fn push_ai<S: Into<String>>(&mut self, text: S, estimated_audio_seconds: u32) -> &Turn {
        self.push(
            text.into(),
            Sender::Ai,
            TurnKind::Voice,
            Some(estimated_audio_seconds),
        )
    }

    /// Rewrites an existing turn in place, keeping its id and position.
    pub fn replace<S: Into<String>>(
        &mut self,
        id: &str,
        text: S,
        estimated_audio_seconds: u32,
    ) -> Option<&Turn> {
        let turn = self.turns.iter_mut().find(|turn| turn.id == id)?;
        turn.text = text.into();
        turn.created_at = SystemTime::now();
        turn.estimated_audio_seconds = Some(estimated_audio_seconds);
        Some(turn)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.turns.iter().position(|turn| turn.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_ai(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.is_ai())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    fn push(
        &mut self,
        text: String,
        sender: Sender,
        kind: TurnKind,
        estimated_audio_seconds: Option<u32>,
    ) -> &Turn {
        self.next_id = self.next_id.saturating_add(1);
        self.turns.push(Turn {
            id: format!("turn-{}", self.next_id),
            text,
            sender,
            created_at: SystemTime::now(),
            kind,
            estimated_audio_seconds,
        });
        &self.turns[self.turns.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_has_a_floor_of_three_seconds() {
        assert_eq!(estimate_audio_seconds(""), 3);
        assert_eq!(estimate_audio_seconds("¡Hola! ¿Qué tal?"), 3);
        assert_eq!(estimate_audio_seconds(&"a".repeat(90)), 6);
        // Counted in characters, not bytes.
        assert_eq!(estimate_audio_seconds(&"ñ".repeat(60)), 4);
    }

    #[test]
    fn replace_keeps_id_and_position() {
        let mut log = TurnLog::new();
        log.push_ai("¡Hola!", 3);
        log.push_user("Hola");
        let ai_id = log.push_ai("¿Qué tal?", 3).id.clone();

        let replaced = log
            .replace(&ai_id, "¿Cómo estás hoy?", 4)
            .expect("turn exists")
            .clone();

        assert_eq!(replaced.id, ai_id);
        assert_eq!(log.len(), 3);
        assert_eq!(log.position(&ai_id), Some(2));
        assert_eq!(log.get(2).map(|turn| turn.text.as_str()), Some("¿Cómo estás hoy?"));
        assert_eq!(replaced.estimated_audio_seconds, Some(4));
        assert!(log.replace("turn-99", "nada", 3).is_none());
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut log = TurnLog::new();
        let first = log.push_user("uno").id.clone();
        let second = log.push_ai("dos", 3).id.clone();

        assert_ne!(first, second);
        assert_eq!(log.last_ai().map(|turn| turn.id.clone()), Some(second));
        assert_eq!(log.as_slice()[0].kind, TurnKind::Text);
        assert_eq!(log.as_slice()[1].kind, TurnKind::Voice);
    }
}
