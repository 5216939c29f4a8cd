use std::time::Duration;

use super::support::{FakeCapture, FakeSpeaker, Harness, ScriptedResponder};
use crate::orchestrator::config::TutorConfig;
use crate::orchestrator::constants::{APOLOGY, GREETING, RESPONSE_FAILED_MESSAGE};
use crate::orchestrator::error::{ResponderError, SessionError};
use crate::orchestrator::types::{Capability, Difficulty, SessionUpdate, Topic, TurnState};
use crate::responder::prompt::system_prompt;
use crate::session::history::{HistoryEntry, Role, SEEDED_LEN};
use crate::session::turn::{Sender, TurnKind};
use crate::speech::types::ResultSegment;

fn speaking_config() -> TutorConfig {
    TutorConfig {
        speak_greeting: false,
        ..TutorConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn start_greets_and_seeds_history() {
    let h = Harness::with(
        TutorConfig::default(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::default(),
    );

    let turns = h.orchestrator.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].text, GREETING);
    assert_eq!(turns[0].sender, Sender::Ai);
    assert_eq!(turns[0].estimated_audio_seconds, Some(3));

    let history = h.orchestrator.history().entries();
    assert_eq!(history.len(), SEEDED_LEN);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[1], HistoryEntry::assistant(GREETING));

    assert_eq!(h.orchestrator.state(), TurnState::Speaking);
    let spoken = h.output.spoken();
    assert_eq!(spoken.len(), 1);
    assert_eq!(
        spoken[0].voice.as_ref().map(|voice| voice.name.as_str()),
        Some("Jorge")
    );
}

#[tokio::test(start_paused = true)]
async fn empty_listening_period_changes_nothing() {
    let mut h = Harness::quiet(ScriptedResponder::default());
    h.updates();

    assert_eq!(h.orchestrator.toggle_listening(), Ok(TurnState::Listening));
    assert_eq!(h.orchestrator.toggle_listening(), Ok(TurnState::Idle));
    h.pump().await;

    assert_eq!(h.orchestrator.turns().len(), 1);
    assert_eq!(h.orchestrator.history().len(), SEEDED_LEN);
    assert!(h.responder.requests().is_empty());
    assert_eq!(h.capture.open_streams(), 0);

    let changes: Vec<_> = h
        .updates()
        .into_iter()
        .filter_map(|update| match update {
            SessionUpdate::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (TurnState::Idle, TurnState::Listening),
            (TurnState::Listening, TurnState::Idle),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn spoken_exchange_is_answered_then_listening_resumes() {
    let mut h = Harness::with(
        speaking_config(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::replying(["¡Hola! ¿Qué tal?"]),
    );

    h.say("Hola").await;

    assert_eq!(h.orchestrator.state(), TurnState::Speaking);
    let turns = h.orchestrator.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].sender, Sender::User);
    assert_eq!(turns[1].kind, TurnKind::Text);
    assert_eq!(turns[1].text, "Hola");
    assert_eq!(turns[2].sender, Sender::Ai);
    assert_eq!(turns[2].kind, TurnKind::Voice);
    assert_eq!(turns[2].text, "¡Hola! ¿Qué tal?");
    assert_eq!(h.output.spoken_texts(), vec!["¡Hola! ¿Qué tal?".to_string()]);

    let requests = h.responder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_text, "Hola");
    assert_eq!(requests[0].history.len(), SEEDED_LEN);

    let history = h.orchestrator.history().entries();
    assert_eq!(history.len(), SEEDED_LEN + 2);
    assert_eq!(history[2], HistoryEntry::user("Hola"));
    assert_eq!(history[3], HistoryEntry::assistant("¡Hola! ¿Qué tal?"));

    assert!(h.output.finish_current());
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);

    h.advance(Duration::from_millis(700)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    h.advance(Duration::from_millis(100)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Listening);
    assert_eq!(h.capture.open_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn responder_failure_apologises_without_touching_history() {
    let mut h = Harness::with(
        speaking_config(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::new(vec![Err(ResponderError::Http {
            status: 500,
            message: "upstream exploded".into(),
        })]),
    );
    h.updates();

    h.say("Hola").await;

    let turns = h.orchestrator.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].text, "Hola");
    assert_eq!(turns[2].text, APOLOGY);
    assert_eq!(turns[2].estimated_audio_seconds, Some(4));
    assert_eq!(h.orchestrator.history().len(), SEEDED_LEN);
    assert_eq!(h.orchestrator.error(), Some(RESPONSE_FAILED_MESSAGE));
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);
    assert_eq!(h.output.spoken_texts(), vec![APOLOGY.to_string()]);
    assert!(h
        .updates()
        .iter()
        .any(|update| matches!(update, SessionUpdate::RecoverableError(_))));

    h.orchestrator.clear_error();
    assert_eq!(h.orchestrator.error(), None);
    assert!(h
        .updates()
        .iter()
        .any(|update| matches!(update, SessionUpdate::ErrorCleared)));
}

#[tokio::test(start_paused = true)]
async fn empty_reply_counts_as_failure() {
    let mut h = Harness::quiet(ScriptedResponder::replying(["   "]));

    h.say("Hola").await;

    assert_eq!(h.orchestrator.turns().last().map(|t| t.text.as_str()), Some(APOLOGY));
    assert_eq!(h.orchestrator.history().len(), SEEDED_LEN);
}

#[tokio::test(start_paused = true)]
async fn history_grows_two_entries_per_exchange() {
    let mut h = Harness::quiet(ScriptedResponder::replying(["Uno.", "Dos.", "Tres."]));

    for (n, line) in ["Hola", "Me llamo Ana", "Gracias"].into_iter().enumerate() {
        h.say(line).await;
        assert!(h.output.finish_current());
        h.pump().await;

        let exchanges = n + 1;
        assert_eq!(h.orchestrator.history().len(), SEEDED_LEN + 2 * exchanges);
        assert_eq!(h.orchestrator.history().completed_exchanges(), exchanges);
        assert_eq!(h.orchestrator.turns().len(), 1 + 2 * exchanges);
    }

    let requests = h.responder.requests();
    assert_eq!(requests[2].history.len(), SEEDED_LEN + 4);
}

#[tokio::test(start_paused = true)]
async fn requests_are_single_flight() {
    let mut h = Harness::quiet(
        ScriptedResponder::replying(["Bien."]).with_delay(Duration::from_secs(2)),
    );

    h.say("Hola").await;
    assert_eq!(h.orchestrator.state(), TurnState::AwaitingResponse);

    assert_eq!(
        h.orchestrator.toggle_listening(),
        Err(SessionError::ResponseInFlight)
    );
    assert_eq!(
        h.orchestrator.send_text("¿Y tú?"),
        Err(SessionError::ResponseInFlight)
    );
    assert_eq!(
        h.orchestrator.retry_turn("turn-1"),
        Err(SessionError::ResponseInFlight)
    );
    assert_eq!(
        h.orchestrator.set_topic(Topic::Travel),
        Err(SessionError::ResponseInFlight)
    );
    assert_eq!(h.responder.requests().len(), 1);

    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);
    assert_eq!(h.orchestrator.turns().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn typed_message_rules() {
    let mut h = Harness::with(
        TutorConfig::default(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::default(),
    );

    assert_eq!(h.orchestrator.send_text("   "), Err(SessionError::EmptyMessage));
    assert_eq!(
        h.orchestrator.send_text("Hola"),
        Err(SessionError::InvalidState { state: "speaking" })
    );

    h.orchestrator.skip();
    assert_eq!(h.orchestrator.toggle_listening(), Ok(TurnState::Listening));
    assert!(h.capture.push(ResultSegment::interim(0, "algo a medias")));
    h.pump().await;

    assert_eq!(h.orchestrator.send_text("  Escrito  "), Ok(()));
    assert_eq!(h.capture.open_streams(), 0);
    assert_eq!(h.orchestrator.state(), TurnState::AwaitingResponse);
    assert_eq!(h.orchestrator.turns()[1].text, "Escrito");
    assert_eq!(h.orchestrator.turns().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn text_only_when_capture_is_missing() {
    let mut h = Harness::with(
        speaking_config(),
        FakeCapture::unavailable(),
        FakeSpeaker::default(),
        ScriptedResponder::replying(["Muy bien."]),
    );
    assert!(h
        .updates()
        .iter()
        .any(|update| matches!(update, SessionUpdate::Unavailable(Capability::Capture))));

    assert_eq!(
        h.orchestrator.toggle_listening(),
        Err(SessionError::CapabilityUnavailable(Capability::Capture))
    );
    assert_eq!(h.orchestrator.send_text("Hola"), Ok(()));
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);

    assert!(h.output.finish_current());
    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
}

#[tokio::test(start_paused = true)]
async fn skip_silences_the_tutor_only() {
    let mut h = Harness::with(
        TutorConfig::default(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::default(),
    );
    h.updates();

    h.orchestrator.skip();
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert_eq!(h.output.cancels(), 1);
    assert!(h
        .updates()
        .iter()
        .any(|update| matches!(update, SessionUpdate::SpeakingFinished)));

    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle, "skip never auto-listens");

    assert_eq!(h.orchestrator.toggle_listening(), Ok(TurnState::Listening));
    h.orchestrator.skip();
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Listening);
    assert_eq!(h.capture.open_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn skip_cancels_pending_auto_listen() {
    let mut h = Harness::with(
        speaking_config(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::replying(["Vale."]),
    );

    h.say("Hola").await;
    assert!(h.output.finish_current());
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);

    h.orchestrator.skip();
    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert_eq!(h.capture.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn disabling_auto_listen_cancels_the_timer() {
    let mut h = Harness::with(
        speaking_config(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::replying(["Vale."]),
    );

    h.say("Hola").await;
    assert!(h.output.finish_current());
    h.pump().await;

    h.orchestrator.set_auto_listen(false);
    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert!(!h.orchestrator.snapshot().auto_listen);
}

#[tokio::test(start_paused = true)]
async fn toggling_while_speaking_interrupts_the_tutor() {
    let mut h = Harness::with(
        TutorConfig::default(),
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::default(),
    );
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);

    assert_eq!(h.orchestrator.toggle_listening(), Ok(TurnState::Listening));
    h.pump().await;

    assert_eq!(h.output.cancels(), 1);
    assert_eq!(h.orchestrator.state(), TurnState::Listening);
    assert_eq!(h.capture.open_streams(), 1);
    assert!(!h.orchestrator.snapshot().output.active);
}

#[tokio::test(start_paused = true)]
async fn repeat_only_while_speaking() {
    let mut h = Harness::with(
        TutorConfig {
            auto_listen: false,
            ..TutorConfig::default()
        },
        FakeCapture::default(),
        FakeSpeaker::default(),
        ScriptedResponder::default(),
    );

    assert_eq!(h.orchestrator.retry_last_speech(), Ok(()));
    h.pump().await;
    assert_eq!(
        h.output.spoken_texts(),
        vec![GREETING.to_string(), GREETING.to_string()]
    );
    assert_eq!(h.output.overlaps(), 0);
    assert_eq!(h.orchestrator.state(), TurnState::Speaking);

    assert!(h.output.finish_current());
    h.pump().await;
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert_eq!(
        h.orchestrator.retry_last_speech(),
        Err(SessionError::InvalidState { state: "idle" })
    );
}

#[tokio::test(start_paused = true)]
async fn topic_change_reseeds_history_but_keeps_turns() {
    let mut h = Harness::quiet(ScriptedResponder::replying(["Vale."]));
    h.say("Hola").await;
    assert!(h.output.finish_current());
    h.pump().await;
    h.updates();

    assert_eq!(h.orchestrator.set_topic(Topic::Travel), Ok(()));
    let history = h.orchestrator.history().entries();
    assert_eq!(history.len(), SEEDED_LEN);
    assert_eq!(
        history[0].content,
        system_prompt(Difficulty::Beginner, Topic::Travel)
    );
    assert_eq!(h.orchestrator.turns().len(), 3);
    assert_eq!(h.orchestrator.snapshot().topic, Topic::Travel);
    assert!(h
        .updates()
        .iter()
        .any(|update| matches!(update, SessionUpdate::Notice(_))));

    assert_eq!(h.orchestrator.set_topic(Topic::Travel), Ok(()));
    assert!(h.updates().is_empty());

    assert_eq!(h.orchestrator.set_difficulty(Difficulty::Advanced), Ok(()));
    assert_eq!(
        h.orchestrator.history().entries()[0].content,
        system_prompt(Difficulty::Advanced, Topic::Travel)
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_abandons_the_pending_response() {
    let mut h = Harness::quiet(
        ScriptedResponder::replying(["Tarde."]).with_delay(Duration::from_secs(1)),
    );
    h.say("Hola").await;
    assert_eq!(h.orchestrator.state(), TurnState::AwaitingResponse);

    h.orchestrator.teardown();
    assert_eq!(h.orchestrator.state(), TurnState::Idle);

    h.advance(Duration::from_secs(5)).await;
    assert_eq!(h.orchestrator.turns().len(), 2);
    assert!(h.output.spoken_texts().is_empty());
    assert_eq!(h.capture.open_streams(), 0);
}
