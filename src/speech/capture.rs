//! Continuous capture stream with transparent restarts.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::speech::traits::{CaptureDevice, EventSink};
use crate::speech::types::{CaptureConfig, CaptureErrorKind, DeviceError, ResultSegment, StreamId};
use crate::telemetry::events::record_capture_restart;

/// Caller-visible capture state. `active` is true iff a stream is open;
/// `wants_listening` is the caller's intent and outlives unsolicited ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub active: bool,
    pub wants_listening: bool,
    pub running_transcript: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStart {
    Started(StreamId),
    AlreadyActive,
    Unavailable,
    Failed(DeviceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The stream closed while listening was still wanted and a new one was opened.
    Restarted(StreamId),
    Stopped,
    /// Reopening failed; listening has been abandoned, the transcript is kept.
    RestartFailed(DeviceError),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFault {
    Transient,
    /// The device is disabled for the rest of the session.
    Fatal,
    Ignored,
}

pub struct SpeechCaptureSession {
    device: Arc<dyn CaptureDevice>,
    sink: EventSink,
    config: CaptureConfig,
    available: bool,
    state: CaptureState,
    stream: Option<StreamId>,
    next_stream: u64,
    /// Transcript of streams that already ended during this listening period.
    carried: String,
    segments: Vec<String>,
    restarts: u32,
}

impl std::fmt::Debug for SpeechCaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCaptureSession")
            .field("config", &self.config)
            .field("available", &self.available)
            .field("state", &self.state)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl SpeechCaptureSession {
    /// Probes the device once; the answer is cached for the session.
    pub fn new(device: Arc<dyn CaptureDevice>, config: CaptureConfig, sink: EventSink) -> Self {
        let available = device.is_available();
        if !available {
            info!(target: "speech_capture", "no capture device, running text-only");
        }

        Self {
            device,
            sink,
            config,
            available,
            state: CaptureState::default(),
            stream: None,
            next_stream: 0,
            carried: String::new(),
            segments: Vec::new(),
            restarts: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn transcript(&self) -> &str {
        &self.state.running_transcript
    }

    pub fn start(&mut self) -> CaptureStart {
        if !self.available {
            return CaptureStart::Unavailable;
        }
        if self.state.active {
            return CaptureStart::AlreadyActive;
        }

        self.reset_transcript();
        self.restarts = 0;

        match self.open_stream() {
            Ok(stream) => {
                self.state.wants_listening = true;
                info!(target: "speech_capture", %stream, lang = %self.config.lang, "capture started");
                CaptureStart::Started(stream)
            }
            Err(err) => {
                warn!(target: "speech_capture", %err, "failed to open capture stream");
                CaptureStart::Failed(err)
            }
        }
    }

    /// Stops listening and hands back the trimmed transcript, if any.
    pub fn stop(&mut self) -> Option<String> {
        if !self.state.active && !self.state.wants_listening {
            return None;
        }

        self.state.wants_listening = false;
        self.close_stream();
        self.take_transcript()
    }

    /// Closes without finalizing anything; used on teardown.
    pub fn shutdown(&mut self) {
        self.state.wants_listening = false;
        self.close_stream();
        self.reset_transcript();
    }

    /// Drains whatever transcript was accumulated.
    pub fn take_transcript(&mut self) -> Option<String> {
        let text = self.state.running_transcript.trim().to_string();
        self.reset_transcript();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Applies a result segment; returns the recomputed transcript unless the
    /// segment belongs to a stream that is no longer current.
    pub fn on_result(&mut self, stream: StreamId, segment: ResultSegment) -> Option<&str> {
        if self.stream != Some(stream) {
            debug!(target: "speech_capture", %stream, "ignoring result from stale stream");
            return None;
        }

        if self.segments.len() <= segment.index {
            self.segments.resize(segment.index + 1, String::new());
        }
        self.segments[segment.index] = segment.transcript;

        let mut running = self.carried.clone();
        for part in &self.segments {
            running.push_str(part);
        }
        self.state.running_transcript = running;

        Some(&self.state.running_transcript)
    }

    /// Handles the end of a stream. `wants_listening` is read here, so a
    /// `stop()` processed before this event suppresses the restart.
    pub fn on_ended(&mut self, stream: StreamId) -> CaptureEnd {
        if self.stream != Some(stream) {
            return CaptureEnd::Ignored;
        }

        self.stream = None;
        self.state.active = false;

        if !self.state.wants_listening {
            debug!(target: "speech_capture", %stream, "capture stream ended");
            return CaptureEnd::Stopped;
        }

        self.carried = self.state.running_transcript.clone();
        self.segments.clear();

        match self.open_stream() {
            Ok(next) => {
                self.restarts = self.restarts.saturating_add(1);
                record_capture_restart(
                    next.0,
                    self.restarts,
                    self.state.running_transcript.chars().count(),
                );
                CaptureEnd::Restarted(next)
            }
            Err(err) => {
                warn!(target: "speech_capture", %err, "failed to reopen capture stream");
                self.state.wants_listening = false;
                CaptureEnd::RestartFailed(err)
            }
        }
    }

    pub fn on_error(&mut self, stream: StreamId, error: &CaptureErrorKind) -> CaptureFault {
        if self.stream != Some(stream) {
            return CaptureFault::Ignored;
        }

        if error.is_fatal() {
            warn!(
                target: "speech_capture",
                %stream,
                error = error.as_str(),
                "capture device failed, disabling capture"
            );
            self.available = false;
            self.state.wants_listening = false;
            self.close_stream();
            CaptureFault::Fatal
        } else {
            debug!(
                target: "speech_capture",
                %stream,
                error = error.as_str(),
                "transient capture error"
            );
            CaptureFault::Transient
        }
    }

    fn open_stream(&mut self) -> Result<StreamId, DeviceError> {
        self.next_stream = self.next_stream.saturating_add(1);
        let stream = StreamId(self.next_stream);
        self.device.open(stream, &self.config, self.sink.clone())?;
        self.stream = Some(stream);
        self.state.active = true;
        Ok(stream)
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.device.close(stream);
        }
        self.state.active = false;
    }

    fn reset_transcript(&mut self) {
        self.carried.clear();
        self.segments.clear();
        self.state.running_transcript.clear();
    }
}
