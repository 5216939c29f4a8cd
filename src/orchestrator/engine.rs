use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::orchestrator::config::TutorConfig;
use crate::orchestrator::constants::{
    APOLOGY, APOLOGY_AUDIO_SECONDS, GREETING, GREETING_AUDIO_SECONDS, RESPONSE_FAILED_MESSAGE,
};
use crate::orchestrator::error::{ResponderError, SessionError};
use crate::orchestrator::traits::{Responder, ResponderReply, ResponderRequest};
use crate::orchestrator::types::{
    Capability, Difficulty, RetryRejection, SessionCommand, SessionEvent, SessionNotice,
    SessionSnapshot, SessionUpdate, Topic, TurnState,
};
use crate::responder::prompt::system_prompt;
use crate::session::history::{ConversationHistoryStore, HistoryEntry};
use crate::session::turn::{estimate_audio_seconds, Turn, TurnLog};
use crate::speech::capture::{CaptureEnd, CaptureFault, CaptureStart, SpeechCaptureSession};
use crate::speech::output::{OutputFailure, SpeakOutcome, SpeechOutputController};
use crate::speech::timer::ScheduledTask;
use crate::speech::traits::{CaptureDevice, EventSink, OutputDevice};
use crate::speech::types::{SpeakOptions, SpeechEvent};
use crate::telemetry::events::{
    record_exchange_completed, record_exchange_failed, record_turn_retried,
};

const TARGET: &str = "turn_orchestrator";

/// Whether the session loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

enum RequestPurpose {
    Send,
    Retry {
        turn_id: String,
        /// History pair removed before the call; restored if the call fails.
        rewound: Option<Vec<HistoryEntry>>,
    },
}

struct InFlight {
    id: u64,
    user_text: String,
    purpose: RequestPurpose,
    started: Instant,
    task: JoinHandle<()>,
}

struct PendingAutoListen {
    token: u64,
    _timer: ScheduledTask,
}

/// The turn-taking state machine. Owned by exactly one session loop; every
/// method runs on that loop, so nothing here is shared or locked.
pub struct TurnOrchestrator {
    capture: SpeechCaptureSession,
    output: SpeechOutputController,
    history: ConversationHistoryStore,
    turns: TurnLog,
    responder: Arc<dyn Responder>,
    sink: EventSink,
    updates: broadcast::Sender<SessionUpdate>,
    state: TurnState,
    topic: Topic,
    difficulty: Difficulty,
    auto_listen: bool,
    auto_listen_delay: Duration,
    speak_greeting: bool,
    error: Option<String>,
    /// AI turns whose exchange is recorded in `history`.
    committed: HashSet<String>,
    in_flight: Option<InFlight>,
    next_request: u64,
    auto_listen_timer: Option<PendingAutoListen>,
    next_token: u64,
}

impl TurnOrchestrator {
    pub fn new(
        config: &TutorConfig,
        capture_device: Arc<dyn CaptureDevice>,
        output_device: Arc<dyn OutputDevice>,
        responder: Arc<dyn Responder>,
        sink: EventSink,
        updates: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        let capture =
            SpeechCaptureSession::new(capture_device, config.capture.clone(), sink.clone());
        let output = SpeechOutputController::new(output_device, config.output.clone(), sink.clone());

        Self {
            capture,
            output,
            history: ConversationHistoryStore::new(),
            turns: TurnLog::new(),
            responder,
            sink,
            updates,
            state: TurnState::Idle,
            topic: config.topic,
            difficulty: config.difficulty,
            auto_listen: config.auto_listen,
            auto_listen_delay: config.auto_listen_delay(),
            speak_greeting: config.speak_greeting,
            error: None,
            committed: HashSet::new(),
            in_flight: None,
            next_request: 0,
            auto_listen_timer: None,
            next_token: 0,
        }
    }

    /// Seeds the conversation and greets the learner.
    pub fn start(&mut self) {
        self.history
            .seed(system_prompt(self.difficulty, self.topic), GREETING);
        let greeting = self.turns.push_ai(GREETING, GREETING_AUDIO_SECONDS).clone();
        self.publish(SessionUpdate::TurnAppended(greeting));

        if !self.capture.is_available() {
            self.publish(SessionUpdate::Unavailable(Capability::Capture));
        }
        if !self.output.is_available() {
            self.publish(SessionUpdate::Unavailable(Capability::Output));
        }

        info!(
            target: TARGET,
            topic = %self.topic,
            difficulty = %self.difficulty,
            capture = self.capture.is_available(),
            output = self.output.is_available(),
            "conversation started"
        );

        if self.speak_greeting {
            self.speak(GREETING, SpeakOptions::greeting());
        }
    }

    pub(crate) fn handle(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Command(command) => return self.handle_command(command),
            SessionEvent::Speech(event) => self.handle_speech(event),
            SessionEvent::ResponderFinished { request, result } => {
                self.on_responder_finished(request, result)
            }
            SessionEvent::AutoListenDue { token } => self.on_auto_listen_due(token),
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: SessionCommand) -> Flow {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            SessionCommand::ToggleListening(reply) => {
                let _ = reply.send(self.toggle_listening());
            }
            SessionCommand::SendText(text, reply) => {
                let _ = reply.send(self.send_text(&text));
            }
            SessionCommand::Skip(reply) => {
                self.skip();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::RetryLastSpeech(reply) => {
                let _ = reply.send(self.retry_last_speech());
            }
            SessionCommand::RetryTurn(turn_id, reply) => {
                let _ = reply.send(self.retry_turn(&turn_id));
            }
            SessionCommand::SetAutoListen(enabled, reply) => {
                self.set_auto_listen(enabled);
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SetTopic(topic, reply) => {
                let _ = reply.send(self.set_topic(topic));
            }
            SessionCommand::SetDifficulty(difficulty, reply) => {
                let _ = reply.send(self.set_difficulty(difficulty));
            }
            SessionCommand::ClearError(reply) => {
                self.clear_error();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            SessionCommand::Teardown(reply) => {
                self.teardown();
                let _ = reply.send(Ok(()));
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    pub fn toggle_listening(&mut self) -> Result<TurnState, SessionError> {
        match self.state {
            TurnState::Idle => {
                self.cancel_auto_listen();
                self.start_listening()?;
            }
            TurnState::Listening => match self.capture.stop() {
                Some(text) => self.submit(text),
                None => {
                    debug!(target: TARGET, "nothing heard, back to idle");
                    self.set_state(TurnState::Idle);
                }
            },
            TurnState::AwaitingResponse => return Err(SessionError::ResponseInFlight),
            TurnState::Speaking => {
                if !self.capture.is_available() {
                    return Err(SessionError::CapabilityUnavailable(Capability::Capture));
                }
                info!(target: TARGET, "learner interrupted the tutor");
                self.output.cancel();
                self.finish_speaking(false);
                self.start_listening()?;
            }
        }
        Ok(self.state)
    }

    /// Typed message; the text-only path when capture is unavailable.
    pub fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        match self.state {
            TurnState::AwaitingResponse => return Err(SessionError::ResponseInFlight),
            TurnState::Speaking => return Err(self.invalid_state()),
            TurnState::Listening => {
                self.capture.stop();
            }
            TurnState::Idle => self.cancel_auto_listen(),
        }
        self.submit(text.to_string());
        Ok(())
    }

    /// Silences the tutor. Capture and any pending response are unaffected.
    pub fn skip(&mut self) {
        self.cancel_auto_listen();
        self.output.cancel();
        self.finish_speaking(false);
    }

    pub fn retry_last_speech(&mut self) -> Result<(), SessionError> {
        if self.state != TurnState::Speaking {
            return Err(self.invalid_state());
        }
        let text = match self.turns.last_ai() {
            Some(turn) => turn.text.clone(),
            None => return Err(self.invalid_state()),
        };
        debug!(target: TARGET, "repeating last tutor turn");
        self.speak(&text, SpeakOptions::default());
        Ok(())
    }

    /// Asks the responder again for the answer to the latest exchange and
    /// replaces that AI turn in place.
    pub fn retry_turn(&mut self, turn_id: &str) -> Result<(), SessionError> {
        match self.state {
            TurnState::AwaitingResponse => return Err(SessionError::ResponseInFlight),
            TurnState::Speaking => return Err(self.invalid_state()),
            TurnState::Idle | TurnState::Listening => {}
        }
        let user_text = self.retry_source(turn_id)?;

        if self.state == TurnState::Listening {
            self.capture.stop();
        }
        self.cancel_auto_listen();
        self.output.cancel();

        let rewound = if self.committed.contains(turn_id) {
            let pair = self.history.last_exchange().map(<[HistoryEntry]>::to_vec);
            if pair.is_some() {
                self.history.rewind_last_exchange();
            }
            pair
        } else {
            None
        };

        info!(
            target: TARGET,
            turn_id,
            rewound = rewound.is_some(),
            "retrying tutor turn"
        );
        self.dispatch(
            user_text,
            RequestPurpose::Retry {
                turn_id: turn_id.to_string(),
                rewound,
            },
        );
        Ok(())
    }

    pub fn set_auto_listen(&mut self, enabled: bool) {
        self.auto_listen = enabled;
        if !enabled {
            self.cancel_auto_listen();
        }
    }

    pub fn set_topic(&mut self, topic: Topic) -> Result<(), SessionError> {
        if self.state == TurnState::AwaitingResponse {
            return Err(SessionError::ResponseInFlight);
        }
        if topic != self.topic {
            self.topic = topic;
            self.reseed();
        }
        Ok(())
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) -> Result<(), SessionError> {
        if self.state == TurnState::AwaitingResponse {
            return Err(SessionError::ResponseInFlight);
        }
        if difficulty != self.difficulty {
            self.difficulty = difficulty;
            self.reseed();
        }
        Ok(())
    }

    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.publish(SessionUpdate::ErrorCleared);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            turns: self.turns.as_slice().to_vec(),
            history: self.history.snapshot(),
            capture: self.capture.state().clone(),
            output: self.output.state(),
            topic: self.topic,
            difficulty: self.difficulty,
            auto_listen: self.auto_listen,
            error: self.error.clone(),
            capture_available: self.capture.is_available(),
            output_available: self.output.is_available(),
        }
    }

    /// Stops capture, output, timers and any pending responder call.
    pub fn teardown(&mut self) {
        self.release();
        self.set_state(TurnState::Idle);
        info!(
            target: TARGET,
            turns = self.turns.len(),
            exchanges = self.history.completed_exchanges(),
            "conversation torn down"
        );
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn turns(&self) -> &[Turn] {
        self.turns.as_slice()
    }

    pub fn history(&self) -> &ConversationHistoryStore {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn capture_available(&self) -> bool {
        self.capture.is_available()
    }

    pub fn output_available(&self) -> bool {
        self.output.is_available()
    }

    fn handle_speech(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::CaptureResult { stream, segment } => {
                if let Some(text) = self.capture.on_result(stream, segment) {
                    let text = text.to_string();
                    self.publish(SessionUpdate::TranscriptUpdated(text));
                }
            }
            SpeechEvent::CaptureEnded { stream } => match self.capture.on_ended(stream) {
                CaptureEnd::Restarted(next) => {
                    debug!(target: TARGET, %stream, %next, "capture restarted");
                }
                CaptureEnd::Stopped | CaptureEnd::Ignored => {}
                CaptureEnd::RestartFailed(err) => {
                    warn!(target: TARGET, %err, "capture could not be resumed");
                    self.notify(SessionNotice::warn("Listening stopped unexpectedly."));
                    self.abandon_listening(true);
                }
            },
            SpeechEvent::CaptureError { stream, error } => {
                if self.capture.on_error(stream, &error) == CaptureFault::Fatal {
                    self.publish(SessionUpdate::Unavailable(Capability::Capture));
                    self.abandon_listening(false);
                }
            }
            SpeechEvent::OutputStarted { utterance } => {
                if self.output.on_started(utterance) {
                    self.publish(SessionUpdate::SpeakingStarted(utterance));
                }
            }
            SpeechEvent::OutputEnded { utterance } => {
                if self.output.on_ended(utterance) {
                    self.finish_speaking(true);
                }
            }
            SpeechEvent::OutputError { utterance, reason } => {
                match self.output.on_error(utterance, &reason) {
                    OutputFailure::Ignored | OutputFailure::RetryScheduled => {}
                    OutputFailure::Fatal => self.finish_speaking(false),
                    OutputFailure::GaveUp => self.finish_speaking(true),
                }
            }
            SpeechEvent::KeepAlivePulse { utterance } => self.output.on_keep_alive(utterance),
            SpeechEvent::OutputRetryDue { utterance } => {
                match self.output.on_retry_due(utterance) {
                    None | Some(SpeakOutcome::Started(_)) => {}
                    Some(SpeakOutcome::Unavailable) | Some(SpeakOutcome::Failed(_)) => {
                        self.finish_speaking(true)
                    }
                }
            }
        }
    }

    fn on_responder_finished(
        &mut self,
        request: u64,
        result: Result<ResponderReply, ResponderError>,
    ) {
        match &self.in_flight {
            Some(in_flight) if in_flight.id == request => {}
            _ => {
                debug!(target: TARGET, request, "discarding stale responder result");
                return;
            }
        }
        let Some(InFlight {
            user_text,
            purpose,
            started,
            ..
        }) = self.in_flight.take()
        else {
            return;
        };
        let latency = started.elapsed();

        let result = result.and_then(|reply| {
            if reply.reply_text.trim().is_empty() {
                Err(ResponderError::EmptyReply)
            } else {
                Ok(reply)
            }
        });

        match (purpose, result) {
            (RequestPurpose::Send, Ok(reply)) => self.complete_exchange(&user_text, reply, latency),
            (RequestPurpose::Send, Err(err)) => self.fail_exchange(err, latency),
            (RequestPurpose::Retry { turn_id, rewound }, Ok(reply)) => {
                self.complete_retry(&turn_id, &user_text, reply, rewound.is_some(), latency)
            }
            (RequestPurpose::Retry { turn_id, rewound }, Err(err)) => {
                self.fail_retry(&turn_id, rewound, err, latency)
            }
        }
    }

    fn complete_exchange(&mut self, user_text: &str, reply: ResponderReply, latency: Duration) {
        let reply_text = self.commit_history(user_text, reply);
        let turn = self
            .turns
            .push_ai(reply_text.clone(), estimate_audio_seconds(&reply_text))
            .clone();
        self.committed.insert(turn.id.clone());

        record_exchange_completed(
            &turn.id,
            self.responder.name(),
            reply_text.chars().count(),
            latency,
            self.history.len(),
        );
        self.publish(SessionUpdate::TurnAppended(turn));
        self.speak(&reply_text, SpeakOptions::default());
    }

    fn fail_exchange(&mut self, err: ResponderError, latency: Duration) {
        warn!(target: TARGET, %err, "responder failed, apologising");
        record_exchange_failed(self.responder.name(), err.code(), latency, None);

        let apology = self.turns.push_ai(APOLOGY, APOLOGY_AUDIO_SECONDS).clone();
        self.publish(SessionUpdate::TurnAppended(apology));
        self.raise_error();
        self.speak(APOLOGY, SpeakOptions::default());
    }

    fn complete_retry(
        &mut self,
        turn_id: &str,
        user_text: &str,
        reply: ResponderReply,
        rewound: bool,
        latency: Duration,
    ) {
        let reply_text = self.commit_history(user_text, reply);
        let seconds = estimate_audio_seconds(&reply_text);

        match self.turns.replace(turn_id, reply_text.clone(), seconds).cloned() {
            Some(turn) => {
                self.committed.insert(turn.id.clone());
                self.publish(SessionUpdate::TurnReplaced(turn));
            }
            None => warn!(target: TARGET, turn_id, "retried turn disappeared"),
        }
        record_turn_retried(turn_id, rewound, latency);
        self.speak(&reply_text, SpeakOptions::default());
    }

    fn fail_retry(
        &mut self,
        turn_id: &str,
        rewound: Option<Vec<HistoryEntry>>,
        err: ResponderError,
        latency: Duration,
    ) {
        warn!(target: TARGET, %err, turn_id, "retry failed, keeping previous answer");
        record_exchange_failed(self.responder.name(), err.code(), latency, Some(turn_id));

        for entry in rewound.into_iter().flatten() {
            self.history.append(entry);
        }
        self.raise_error();
        self.set_state(TurnState::Idle);
    }

    /// Records the exchange and returns the reply text.
    fn commit_history(&mut self, user_text: &str, reply: ResponderReply) -> String {
        let ResponderReply {
            reply_text,
            new_history,
        } = reply;

        if let Err(err) = self.history.adopt(new_history) {
            warn!(
                target: TARGET,
                %err,
                "responder history does not extend ours, appending the exchange instead"
            );
            self.history.append(HistoryEntry::user(user_text));
            self.history
                .append(HistoryEntry::assistant(reply_text.clone()));
        }
        reply_text
    }

    fn submit(&mut self, text: String) {
        let turn = self.turns.push_user(text.clone()).clone();
        self.publish(SessionUpdate::TurnAppended(turn));
        self.dispatch(text, RequestPurpose::Send);
    }

    fn dispatch(&mut self, user_text: String, purpose: RequestPurpose) {
        self.next_request = self.next_request.saturating_add(1);
        let id = self.next_request;

        let request = ResponderRequest {
            user_text: user_text.clone(),
            history: self.history.snapshot(),
            difficulty: self.difficulty,
            topic: self.topic,
        };
        let responder = Arc::clone(&self.responder);
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let result = responder.respond(request).await;
            sink.post(SessionEvent::ResponderFinished {
                request: id,
                result,
            });
        });

        debug!(target: TARGET, request = id, responder = self.responder.name(), "awaiting response");
        self.in_flight = Some(InFlight {
            id,
            user_text,
            purpose,
            started: Instant::now(),
            task,
        });
        self.set_state(TurnState::AwaitingResponse);
    }

    fn start_listening(&mut self) -> Result<(), SessionError> {
        match self.capture.start() {
            CaptureStart::Started(_) | CaptureStart::AlreadyActive => {
                self.set_state(TurnState::Listening);
                Ok(())
            }
            CaptureStart::Unavailable => {
                self.publish(SessionUpdate::Unavailable(Capability::Capture));
                Err(SessionError::CapabilityUnavailable(Capability::Capture))
            }
            CaptureStart::Failed(err) => Err(SessionError::Device(err)),
        }
    }

    /// Leaves `Listening` after the device gave up on its own.
    fn abandon_listening(&mut self, keep_transcript: bool) {
        let transcript = self.capture.take_transcript();
        if self.state != TurnState::Listening {
            return;
        }
        match transcript {
            Some(text) if keep_transcript => self.submit(text),
            _ => self.set_state(TurnState::Idle),
        }
    }

    fn speak(&mut self, text: &str, options: SpeakOptions) {
        match self.output.speak(text, options) {
            SpeakOutcome::Started(_) => self.set_state(TurnState::Speaking),
            SpeakOutcome::Unavailable => self.settle(true),
            SpeakOutcome::Failed(err) => {
                warn!(target: TARGET, %err, "could not speak, showing text only");
                self.settle(true);
            }
        }
    }

    fn finish_speaking(&mut self, natural_end: bool) {
        if self.state != TurnState::Speaking {
            return;
        }
        self.publish(SessionUpdate::SpeakingFinished);
        self.settle(natural_end);
    }

    fn settle(&mut self, allow_auto_listen: bool) {
        self.set_state(TurnState::Idle);
        if allow_auto_listen {
            self.schedule_auto_listen();
        }
    }

    fn schedule_auto_listen(&mut self) {
        if !self.auto_listen || !self.capture.is_available() {
            return;
        }
        if !self.turns.last().map(Turn::is_ai).unwrap_or(false) {
            return;
        }

        self.next_token = self.next_token.saturating_add(1);
        let token = self.next_token;
        let timer = ScheduledTask::once(
            self.auto_listen_delay,
            self.sink.clone(),
            SessionEvent::AutoListenDue { token },
        );
        self.auto_listen_timer = Some(PendingAutoListen {
            token,
            _timer: timer,
        });
    }

    fn cancel_auto_listen(&mut self) {
        self.auto_listen_timer = None;
    }

    fn on_auto_listen_due(&mut self, token: u64) {
        match &self.auto_listen_timer {
            Some(pending) if pending.token == token => {}
            _ => return,
        }
        self.auto_listen_timer = None;

        if self.state != TurnState::Idle {
            return;
        }
        if let Err(err) = self.start_listening() {
            warn!(target: TARGET, %err, "auto-listen could not start capture");
        }
    }

    fn reseed(&mut self) {
        self.history
            .seed(system_prompt(self.difficulty, self.topic), GREETING);
        self.committed.clear();
        info!(
            target: TARGET,
            topic = %self.topic,
            difficulty = %self.difficulty,
            "conversation context reset"
        );
        self.notify(SessionNotice::info(format!(
            "Practising {} at {} level.",
            self.topic, self.difficulty
        )));
    }

    fn raise_error(&mut self) {
        self.error = Some(RESPONSE_FAILED_MESSAGE.to_string());
        self.publish(SessionUpdate::RecoverableError(
            RESPONSE_FAILED_MESSAGE.to_string(),
        ));
    }

    fn invalid_state(&self) -> SessionError {
        SessionError::InvalidState {
            state: self.state.as_str(),
        }
    }

    /// Validates a retry target and returns the learner text it answered.
    fn retry_source(&self, turn_id: &str) -> Result<String, SessionError> {
        let reject = SessionError::InvalidRetryTarget;
        let index = self
            .turns
            .position(turn_id)
            .ok_or(reject(RetryRejection::UnknownTurn))?;

        let is_ai = self.turns.get(index).map(Turn::is_ai).unwrap_or(false);
        if !is_ai {
            return Err(reject(RetryRejection::NotAiTurn));
        }
        if index == 0 {
            return Err(reject(RetryRejection::FirstTurn));
        }
        let previous = match self.turns.get(index - 1) {
            Some(turn) if turn.is_user() => turn,
            _ => return Err(reject(RetryRejection::NoPrecedingUserTurn)),
        };
        Ok(previous.text.clone())
    }

    fn set_state(&mut self, to: TurnState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!(target: TARGET, from = from.as_str(), to = to.as_str(), "state changed");
        self.publish(SessionUpdate::StateChanged { from, to });
    }

    fn notify(&self, notice: SessionNotice) {
        self.publish(SessionUpdate::Notice(notice));
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine; updates are advisory.
        let _ = self.updates.send(update);
    }

    fn release(&mut self) {
        self.cancel_auto_listen();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        self.capture.shutdown();
        self.output.cancel();
    }
}

impl Drop for TurnOrchestrator {
    fn drop(&mut self) {
        self.release();
    }
}
