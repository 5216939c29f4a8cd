use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub(crate) const DEFAULT_LANGUAGE_TAG: &str = "es-ES";
pub(crate) const DEFAULT_VOICE_PREFIX: &str = "es";
pub(crate) const DEFAULT_SPEECH_RATE: f32 = 0.9;
pub(crate) const DEFAULT_KEEP_ALIVE_MS: u64 = 5_000;
pub(crate) const DEFAULT_OUTPUT_RETRY_DELAY_MS: u64 = 1_000;

/// One entry of the platform voice catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    pub name: String,
    pub lang: String,
    /// Offline voice bundled with the platform.
    pub local_service: bool,
}

impl VoiceDescriptor {
    pub fn new<N: Into<String>, L: Into<String>>(name: N, lang: L, local_service: bool) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            local_service,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utterance-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// A fully resolved playback request handed to the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub lang: String,
    /// `None` means the platform default voice.
    pub voice: Option<VoiceDescriptor>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeakOptions {
    pub is_initial_greeting: bool,
}

impl SpeakOptions {
    pub fn greeting() -> Self {
        Self {
            is_initial_greeting: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANGUAGE_TAG.to_string(),
            continuous: true,
            interim_results: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub lang: String,
    pub voice_prefix: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub keep_alive_interval_ms: u64,
    pub retry_delay_ms: u64,
}

impl OutputConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANGUAGE_TAG.to_string(),
            voice_prefix: DEFAULT_VOICE_PREFIX.to_string(),
            rate: DEFAULT_SPEECH_RATE,
            pitch: 1.0,
            volume: 1.0,
            keep_alive_interval_ms: DEFAULT_KEEP_ALIVE_MS,
            retry_delay_ms: DEFAULT_OUTPUT_RETRY_DELAY_MS,
        }
    }
}

/// One recognition result segment; `index` is its position within the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSegment {
    pub index: usize,
    pub transcript: String,
    pub is_final: bool,
}

impl ResultSegment {
    pub fn interim<S: Into<String>>(index: usize, transcript: S) -> Self {
        Self {
            index,
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_result<S: Into<String>>(index: usize, transcript: S) -> Self {
        Self {
            index,
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    LanguageNotSupported,
    Other(String),
}

impl CaptureErrorKind {
    /// Errors after which the capture device is unusable for the rest of the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureErrorKind::AudioCapture
                | CaptureErrorKind::NotAllowed
                | CaptureErrorKind::ServiceNotAllowed
                | CaptureErrorKind::LanguageNotSupported
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            CaptureErrorKind::NoSpeech => "no-speech",
            CaptureErrorKind::Aborted => "aborted",
            CaptureErrorKind::AudioCapture => "audio-capture",
            CaptureErrorKind::Network => "network",
            CaptureErrorKind::NotAllowed => "not-allowed",
            CaptureErrorKind::ServiceNotAllowed => "service-not-allowed",
            CaptureErrorKind::LanguageNotSupported => "language-not-supported",
            CaptureErrorKind::Other(reason) => reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputErrorReason {
    Canceled,
    Interrupted,
    AudioBusy,
    AudioHardware,
    Network,
    SynthesisUnavailable,
    SynthesisFailed,
    LanguageUnavailable,
    VoiceUnavailable,
    TextTooLong,
    InvalidArgument,
    NotAllowed,
    Other(String),
}

impl OutputErrorReason {
    /// Cancellation and interruption are never retried.
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            OutputErrorReason::Canceled | OutputErrorReason::Interrupted
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            OutputErrorReason::Canceled => "canceled",
            OutputErrorReason::Interrupted => "interrupted",
            OutputErrorReason::AudioBusy => "audio-busy",
            OutputErrorReason::AudioHardware => "audio-hardware",
            OutputErrorReason::Network => "network",
            OutputErrorReason::SynthesisUnavailable => "synthesis-unavailable",
            OutputErrorReason::SynthesisFailed => "synthesis-failed",
            OutputErrorReason::LanguageUnavailable => "language-unavailable",
            OutputErrorReason::VoiceUnavailable => "voice-unavailable",
            OutputErrorReason::TextTooLong => "text-too-long",
            OutputErrorReason::InvalidArgument => "invalid-argument",
            OutputErrorReason::NotAllowed => "not-allowed",
            OutputErrorReason::Other(reason) => reason.as_str(),
        }
    }
}

/// Inbound signals raised by the speech devices and by the timers the speech
/// components own.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    CaptureResult {
        stream: StreamId,
        segment: ResultSegment,
    },
    CaptureEnded {
        stream: StreamId,
    },
    CaptureError {
        stream: StreamId,
        error: CaptureErrorKind,
    },
    OutputStarted {
        utterance: UtteranceId,
    },
    OutputEnded {
        utterance: UtteranceId,
    },
    OutputError {
        utterance: UtteranceId,
        reason: OutputErrorReason,
    },
    KeepAlivePulse {
        utterance: UtteranceId,
    },
    OutputRetryDue {
        utterance: UtteranceId,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device unavailable")]
    Unavailable,
    #[error("device busy")]
    Busy,
    #[error("device failure: {message}")]
    Failed { message: String },
}

impl DeviceError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
