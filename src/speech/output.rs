//! Single-flight speech output with keep-alive and one-shot retry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::orchestrator::types::SessionEvent;
use crate::speech::timer::ScheduledTask;
use crate::speech::traits::{EventSink, OutputDevice};
use crate::speech::types::{
    DeviceError, OutputConfig, OutputErrorReason, SpeakOptions, SpeechEvent, Utterance,
    UtteranceId,
};
use crate::speech::voice::select_voice;
use crate::telemetry::events::record_output_retry;

/// Caller-visible output state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputState {
    pub active: bool,
    pub current_utterance: Option<UtteranceId>,
    pub keep_alive_armed: bool,
    pub retry_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Started(UtteranceId),
    Unavailable,
    Failed(DeviceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFailure {
    /// Stale utterance; nothing changed.
    Ignored,
    RetryScheduled,
    /// Cancellation or interruption.
    Fatal,
    /// Not retried: greeting, or the retry itself failed.
    GaveUp,
}

struct ActiveUtterance {
    id: UtteranceId,
    text: String,
    options: SpeakOptions,
    is_retry: bool,
    keep_alive: Option<ScheduledTask>,
}

struct PendingRetry {
    failed: UtteranceId,
    text: String,
    options: SpeakOptions,
    _timer: ScheduledTask,
}

pub struct SpeechOutputController {
    device: Arc<dyn OutputDevice>,
    sink: EventSink,
    config: OutputConfig,
    available: bool,
    active: Option<ActiveUtterance>,
    pending_retry: Option<PendingRetry>,
    next_utterance: u64,
}

impl std::fmt::Debug for SpeechOutputController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutputController")
            .field("config", &self.config)
            .field("available", &self.available)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SpeechOutputController {
    pub fn new(device: Arc<dyn OutputDevice>, config: OutputConfig, sink: EventSink) -> Self {
        let available = device.is_available();
        if !available {
            info!(target: "speech_output", "no output device, running text-only");
        }

        Self {
            device,
            sink,
            config,
            available,
            active: None,
            pending_retry: None,
            next_utterance: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.pending_retry.is_some()
    }

    pub fn state(&self) -> OutputState {
        OutputState {
            active: self.active.is_some(),
            current_utterance: self.active.as_ref().map(|active| active.id),
            keep_alive_armed: self
                .active
                .as_ref()
                .map(|active| active.keep_alive.is_some())
                .unwrap_or(false),
            retry_pending: self.pending_retry.is_some(),
        }
    }

    pub fn speak(&mut self, text: &str, options: SpeakOptions) -> SpeakOutcome {
        self.begin(text.to_string(), options, false)
    }

    /// Stops whatever is playing and drops pending retries. Safe to call at any time.
    pub fn cancel(&mut self) {
        self.pending_retry = None;
        if let Some(active) = self.active.take() {
            debug!(target: "speech_output", utterance = %active.id, "cancelling utterance");
            self.device.cancel();
        }
    }

    pub fn on_started(&self, utterance: UtteranceId) -> bool {
        self.is_current(utterance)
    }

    pub fn on_ended(&mut self, utterance: UtteranceId) -> bool {
        if !self.is_current(utterance) {
            return false;
        }
        self.active = None;
        debug!(target: "speech_output", %utterance, "utterance finished");
        true
    }

    pub fn on_error(&mut self, utterance: UtteranceId, reason: &OutputErrorReason) -> OutputFailure {
        if !self.is_current(utterance) {
            return OutputFailure::Ignored;
        }
        let Some(failed) = self.active.take() else {
            return OutputFailure::Ignored;
        };

        if reason.is_user_initiated() {
            debug!(
                target: "speech_output",
                %utterance,
                reason = reason.as_str(),
                "utterance stopped"
            );
            return OutputFailure::Fatal;
        }

        if failed.options.is_initial_greeting || failed.is_retry {
            warn!(
                target: "speech_output",
                %utterance,
                reason = reason.as_str(),
                is_retry = failed.is_retry,
                "speech output failed"
            );
            return OutputFailure::GaveUp;
        }

        let delay = self.config.retry_delay();
        warn!(
            target: "speech_output",
            %utterance,
            reason = reason.as_str(),
            ?delay,
            "speech output failed, retrying once"
        );
        record_output_retry(utterance.0, reason.as_str(), delay);

        let timer = ScheduledTask::once(
            delay,
            self.sink.clone(),
            SessionEvent::Speech(SpeechEvent::OutputRetryDue { utterance }),
        );
        self.pending_retry = Some(PendingRetry {
            failed: utterance,
            text: failed.text,
            options: failed.options,
            _timer: timer,
        });
        OutputFailure::RetryScheduled
    }

    /// Fires the scheduled retry; `None` if it was cancelled or superseded.
    pub fn on_retry_due(&mut self, utterance: UtteranceId) -> Option<SpeakOutcome> {
        match &self.pending_retry {
            Some(pending) if pending.failed == utterance => {}
            _ => return None,
        }
        let pending = self.pending_retry.take()?;
        Some(self.begin(pending.text, pending.options, true))
    }

    /// Pause-then-resume nudge against platforms that truncate long utterances.
    pub fn on_keep_alive(&mut self, utterance: UtteranceId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.id != utterance || active.keep_alive.is_none() {
            return;
        }

        if self.device.is_speaking() {
            self.device.pause();
            self.device.resume();
        } else {
            active.keep_alive = None;
        }
    }

    fn begin(&mut self, text: String, options: SpeakOptions, is_retry: bool) -> SpeakOutcome {
        self.cancel();

        if !self.available {
            return SpeakOutcome::Unavailable;
        }

        self.next_utterance = self.next_utterance.saturating_add(1);
        let id = UtteranceId(self.next_utterance);

        let voices = self.device.voices();
        let voice = select_voice(&voices, &self.config.voice_prefix).cloned();
        match &voice {
            Some(voice) => debug!(
                target: "speech_output",
                voice = %voice.name,
                lang = %voice.lang,
                "selected voice"
            ),
            None => debug!(
                target: "speech_output",
                catalog = voices.len(),
                "no matching voice, using platform default"
            ),
        }

        let utterance = Utterance {
            id,
            text: text.clone(),
            lang: self.config.lang.clone(),
            voice,
            rate: self.config.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
        };

        if let Err(err) = self.device.speak(utterance, self.sink.clone()) {
            warn!(target: "speech_output", %err, utterance = %id, "failed to start utterance");
            return SpeakOutcome::Failed(err);
        }

        let keep_alive = ScheduledTask::every(
            self.config.keep_alive_interval(),
            self.sink.clone(),
            move || SessionEvent::Speech(SpeechEvent::KeepAlivePulse { utterance: id }),
        );

        self.active = Some(ActiveUtterance {
            id,
            text,
            options,
            is_retry,
            keep_alive: Some(keep_alive),
        });
        SpeakOutcome::Started(id)
    }

    fn is_current(&self, utterance: UtteranceId) -> bool {
        self.active
            .as_ref()
            .map(|active| active.id == utterance)
            .unwrap_or(false)
    }
}
