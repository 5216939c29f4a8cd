//! Speech capture and speech output components.

pub mod capture;
pub mod console;
pub mod output;
pub(crate) mod timer;
pub mod traits;
pub mod types;
pub mod voice;

pub use capture::{CaptureEnd, CaptureFault, CaptureStart, CaptureState, SpeechCaptureSession};
pub use console::{LineCaptureDevice, TracingOutputDevice};
pub use output::{OutputFailure, OutputState, SpeakOutcome, SpeechOutputController};
pub use traits::{CaptureDevice, EventSink, NoCaptureDevice, NoOutputDevice, OutputDevice};
pub use types::{
    CaptureConfig, CaptureErrorKind, DeviceError, OutputConfig, OutputErrorReason, ResultSegment,
    SpeakOptions, SpeechEvent, StreamId, Utterance, UtteranceId, VoiceDescriptor,
};
pub use voice::select_voice;
