//! Terminal-backed devices used by the headless binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::speech::traits::{CaptureDevice, EventSink, OutputDevice};
use crate::speech::types::{
    CaptureConfig, DeviceError, OutputErrorReason, ResultSegment, StreamId, Utterance,
    UtteranceId, VoiceDescriptor,
};

const MILLIS_PER_CHAR: u64 = 55;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct OpenStream {
    stream: StreamId,
    sink: EventSink,
    next_index: usize,
}

/// Capture device fed with already-recognized lines of text.
#[derive(Default)]
pub struct LineCaptureDevice {
    open: Mutex<Option<OpenStream>>,
}

impl LineCaptureDevice {
    /// Delivers `line` as the next final segment. Returns `false` when no
    /// stream is open.
    pub fn feed(&self, line: &str) -> bool {
        let mut guard = lock(&self.open);
        let Some(open) = guard.as_mut() else {
            return false;
        };

        let text = if open.next_index == 0 {
            line.to_string()
        } else {
            format!(" {line}")
        };
        let segment = ResultSegment::final_result(open.next_index, text);
        open.next_index += 1;
        open.sink.capture_result(open.stream, segment)
    }
}

impl CaptureDevice for LineCaptureDevice {
    fn is_available(&self) -> bool {
        true
    }

    fn open(
        &self,
        stream: StreamId,
        config: &CaptureConfig,
        sink: EventSink,
    ) -> Result<(), DeviceError> {
        debug!(target: "console_capture", %stream, lang = %config.lang, "stream opened");
        *lock(&self.open) = Some(OpenStream {
            stream,
            sink,
            next_index: 0,
        });
        Ok(())
    }

    fn close(&self, stream: StreamId) {
        let mut guard = lock(&self.open);
        if let Some(open) = guard.take() {
            if open.stream == stream {
                open.sink.capture_ended(stream);
            } else {
                *guard = Some(open);
            }
        }
    }
}

struct Playback {
    utterance: UtteranceId,
    sink: EventSink,
    task: JoinHandle<()>,
}

/// Output device that logs utterances and simulates their playback time.
pub struct TracingOutputDevice {
    speaking: Arc<AtomicBool>,
    playback: Mutex<Option<Playback>>,
    voices: Vec<VoiceDescriptor>,
}

impl Default for TracingOutputDevice {
    fn default() -> Self {
        Self {
            speaking: Arc::new(AtomicBool::new(false)),
            playback: Mutex::new(None),
            voices: vec![
                VoiceDescriptor::new("Monica", "es-ES", true),
                VoiceDescriptor::new("Google español", "es-ES", false),
                VoiceDescriptor::new("Samantha", "en-US", true),
            ],
        }
    }
}

impl OutputDevice for TracingOutputDevice {
    fn is_available(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance, sink: EventSink) -> Result<(), DeviceError> {
        let mut guard = lock(&self.playback);
        if let Some(previous) = guard.take() {
            previous.task.abort();
        }

        info!(
            target: "console_output",
            utterance = %utterance.id,
            voice = utterance.voice.as_ref().map(|voice| voice.name.as_str()).unwrap_or("default"),
            rate = utterance.rate,
            "{}",
            utterance.text
        );

        let length = utterance.text.chars().count() as u64;
        let duration = Duration::from_millis(length.saturating_mul(MILLIS_PER_CHAR))
            .div_f32(utterance.rate.max(0.1));
        let id = utterance.id;
        let speaking = Arc::clone(&self.speaking);
        let task_sink = sink.clone();
        speaking.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            task_sink.output_started(id);
            sleep(duration).await;
            speaking.store(false, Ordering::SeqCst);
            task_sink.output_ended(id);
        });

        *guard = Some(Playback {
            utterance: id,
            sink,
            task,
        });
        Ok(())
    }

    fn cancel(&self) {
        if let Some(playback) = lock(&self.playback).take() {
            if playback.task.is_finished() {
                return;
            }
            playback.task.abort();
            self.speaking.store(false, Ordering::SeqCst);
            playback
                .sink
                .output_error(playback.utterance, OutputErrorReason::Canceled);
        }
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn pause(&self) {}

    fn resume(&self) {}
}
