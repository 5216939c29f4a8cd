use tokio::sync::mpsc;
use tracing::debug;

use crate::orchestrator::types::SessionEvent;
use crate::speech::types::{
    CaptureConfig, CaptureErrorKind, DeviceError, OutputErrorReason, ResultSegment, SpeechEvent,
    StreamId, Utterance, UtteranceId, VoiceDescriptor,
};

/// Continuous speech-to-text capability.
///
/// `open` only has to *begin* opening the stream; results, errors and the end
/// of the stream are reported later through the [`EventSink`].
pub trait CaptureDevice: Send + Sync {
    fn is_available(&self) -> bool;

    fn open(
        &self,
        stream: StreamId,
        config: &CaptureConfig,
        sink: EventSink,
    ) -> Result<(), DeviceError>;

    fn close(&self, stream: StreamId);
}

/// Utterance playback capability.
pub trait OutputDevice: Send + Sync {
    fn is_available(&self) -> bool;

    /// Current catalog snapshot; may grow while the platform loads voices.
    fn voices(&self) -> Vec<VoiceDescriptor>;

    fn speak(&self, utterance: Utterance, sink: EventSink) -> Result<(), DeviceError>;

    fn cancel(&self);

    /// Coarse poll used only by the keep-alive pulse.
    fn is_speaking(&self) -> bool;

    fn pause(&self);

    fn resume(&self);
}

/// Cloneable inbox handle through which devices and timers report back to the
/// session loop.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Returns `false` once the session loop is gone.
    pub fn post(&self, event: SessionEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(target: "speech_events", "session inbox closed, dropping event");
                false
            }
        }
    }

    pub fn speech(&self, event: SpeechEvent) -> bool {
        self.post(SessionEvent::Speech(event))
    }

    pub fn capture_result(&self, stream: StreamId, segment: ResultSegment) -> bool {
        self.speech(SpeechEvent::CaptureResult { stream, segment })
    }

    pub fn capture_ended(&self, stream: StreamId) -> bool {
        self.speech(SpeechEvent::CaptureEnded { stream })
    }

    pub fn capture_error(&self, stream: StreamId, error: CaptureErrorKind) -> bool {
        self.speech(SpeechEvent::CaptureError { stream, error })
    }

    pub fn output_started(&self, utterance: UtteranceId) -> bool {
        self.speech(SpeechEvent::OutputStarted { utterance })
    }

    pub fn output_ended(&self, utterance: UtteranceId) -> bool {
        self.speech(SpeechEvent::OutputEnded { utterance })
    }

    pub fn output_error(&self, utterance: UtteranceId, reason: OutputErrorReason) -> bool {
        self.speech(SpeechEvent::OutputError { utterance, reason })
    }
}

/// Capture device for hosts without speech recognition.
#[derive(Debug, Default)]
pub struct NoCaptureDevice;

impl CaptureDevice for NoCaptureDevice {
    fn is_available(&self) -> bool {
        false
    }

    fn open(
        &self,
        _stream: StreamId,
        _config: &CaptureConfig,
        _sink: EventSink,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable)
    }

    fn close(&self, _stream: StreamId) {}
}

/// Output device for hosts without speech synthesis.
#[derive(Debug, Default)]
pub struct NoOutputDevice;

impl OutputDevice for NoOutputDevice {
    fn is_available(&self) -> bool {
        false
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        Vec::new()
    }

    fn speak(&self, _utterance: Utterance, _sink: EventSink) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable)
    }

    fn cancel(&self) {}

    fn is_speaking(&self) -> bool {
        false
    }

    fn pause(&self) {}

    fn resume(&self) {}
}
