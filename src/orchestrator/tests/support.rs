use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;

use crate::orchestrator::config::TutorConfig;
use crate::orchestrator::engine::TurnOrchestrator;
use crate::orchestrator::error::ResponderError;
use crate::orchestrator::traits::{Responder, ResponderReply, ResponderRequest};
use crate::orchestrator::types::{SessionEvent, SessionUpdate};
use crate::speech::traits::{CaptureDevice, EventSink, OutputDevice};
use crate::speech::types::{
    CaptureConfig, CaptureErrorKind, DeviceError, OutputErrorReason, ResultSegment, StreamId,
    Utterance, UtteranceId, VoiceDescriptor,
};

pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn drain(rx: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(update) => updates.push(update),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    updates
}

#[derive(Default)]
struct CaptureLog {
    current: Option<(StreamId, EventSink)>,
    opened: Vec<StreamId>,
}

/// Capture device driven by the test: it only emits what the test pushes.
#[derive(Default)]
pub(crate) struct FakeCapture {
    unavailable: bool,
    fail_open: AtomicBool,
    log: Mutex<CaptureLog>,
}

impl FakeCapture {
    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub(crate) fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub(crate) fn push(&self, segment: ResultSegment) -> bool {
        let log = self.log.lock().expect("capture log poisoned");
        match &log.current {
            Some((stream, sink)) => sink.capture_result(*stream, segment),
            None => false,
        }
    }

    /// Simulates the platform ending the stream on its own.
    pub(crate) fn end_unsolicited(&self) -> Option<StreamId> {
        let mut log = self.log.lock().expect("capture log poisoned");
        let (stream, sink) = log.current.take()?;
        sink.capture_ended(stream);
        Some(stream)
    }

    pub(crate) fn fail(&self, error: CaptureErrorKind) -> bool {
        let log = self.log.lock().expect("capture log poisoned");
        match &log.current {
            Some((stream, sink)) => sink.capture_error(*stream, error),
            None => false,
        }
    }

    pub(crate) fn current_stream(&self) -> Option<StreamId> {
        self.log
            .lock()
            .expect("capture log poisoned")
            .current
            .as_ref()
            .map(|(stream, _)| *stream)
    }

    pub(crate) fn open_streams(&self) -> usize {
        usize::from(self.current_stream().is_some())
    }

    pub(crate) fn opened(&self) -> Vec<StreamId> {
        self.log.lock().expect("capture log poisoned").opened.clone()
    }
}

impl CaptureDevice for FakeCapture {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn open(
        &self,
        stream: StreamId,
        _config: &CaptureConfig,
        sink: EventSink,
    ) -> Result<(), DeviceError> {
        if self.fail_open.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::failed("microphone busy"));
        }
        let mut log = self.log.lock().expect("capture log poisoned");
        assert!(log.current.is_none(), "two capture streams open at once");
        log.opened.push(stream);
        log.current = Some((stream, sink));
        Ok(())
    }

    fn close(&self, stream: StreamId) {
        let mut log = self.log.lock().expect("capture log poisoned");
        if let Some((current, sink)) = log.current.take() {
            if current == stream {
                sink.capture_ended(stream);
            } else {
                log.current = Some((current, sink));
            }
        }
    }
}

#[derive(Default)]
struct SpeakerLog {
    current: Option<(UtteranceId, EventSink)>,
    spoken: Vec<Utterance>,
}

/// Output device that plays nothing until the test finishes or fails the
/// current utterance.
#[derive(Default)]
pub(crate) struct FakeSpeaker {
    unavailable: bool,
    log: Mutex<SpeakerLog>,
    cancels: AtomicUsize,
    pauses: AtomicUsize,
    overlaps: AtomicUsize,
}

impl FakeSpeaker {
    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub(crate) fn spoken_texts(&self) -> Vec<String> {
        self.log
            .lock()
            .expect("speaker log poisoned")
            .spoken
            .iter()
            .map(|utterance| utterance.text.clone())
            .collect()
    }

    pub(crate) fn spoken(&self) -> Vec<Utterance> {
        self.log.lock().expect("speaker log poisoned").spoken.clone()
    }

    pub(crate) fn current(&self) -> Option<UtteranceId> {
        self.log
            .lock()
            .expect("speaker log poisoned")
            .current
            .as_ref()
            .map(|(id, _)| *id)
    }

    pub(crate) fn start_current(&self) -> bool {
        let log = self.log.lock().expect("speaker log poisoned");
        match &log.current {
            Some((id, sink)) => sink.output_started(*id),
            None => false,
        }
    }

    pub(crate) fn finish_current(&self) -> bool {
        let mut log = self.log.lock().expect("speaker log poisoned");
        match log.current.take() {
            Some((id, sink)) => sink.output_ended(id),
            None => false,
        }
    }

    pub(crate) fn fail_current(&self, reason: OutputErrorReason) -> bool {
        let mut log = self.log.lock().expect("speaker log poisoned");
        match log.current.take() {
            Some((id, sink)) => sink.output_error(id, reason),
            None => false,
        }
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub(crate) fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

impl OutputDevice for FakeSpeaker {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        vec![
            VoiceDescriptor::new("Samantha", "en-US", false),
            VoiceDescriptor::new("Jorge", "es-ES", true),
        ]
    }

    fn speak(&self, utterance: Utterance, sink: EventSink) -> Result<(), DeviceError> {
        let mut log = self.log.lock().expect("speaker log poisoned");
        if log.current.is_some() {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        log.current = Some((utterance.id, sink));
        log.spoken.push(utterance);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut log = self.log.lock().expect("speaker log poisoned");
        if let Some((id, sink)) = log.current.take() {
            sink.output_error(id, OutputErrorReason::Canceled);
        }
    }

    fn is_speaking(&self) -> bool {
        self.current().is_some()
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {}
}

/// Responder that replays scripted outcomes, then answers "Vale.".
#[derive(Default)]
pub(crate) struct ScriptedResponder {
    outcomes: Mutex<VecDeque<Result<String, ResponderError>>>,
    requests: Mutex<Vec<ResponderRequest>>,
    delay: Duration,
}

impl ScriptedResponder {
    pub(crate) fn new(outcomes: Vec<Result<String, ResponderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    pub(crate) fn replying<const N: usize>(replies: [&str; N]) -> Self {
        Self::new(replies.iter().map(|reply| Ok(reply.to_string())).collect())
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<ResponderRequest> {
        self.requests.lock().expect("requests poisoned").clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError> {
        self.requests
            .lock()
            .expect("requests poisoned")
            .push(request.clone());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let next = self
            .outcomes
            .lock()
            .expect("outcomes poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok("Vale.".to_string()));
        next.map(|reply| ResponderReply::extending(&request, reply))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Drives a `TurnOrchestrator` directly, standing in for the session loop.
pub(crate) struct Harness {
    pub(crate) orchestrator: TurnOrchestrator,
    pub(crate) updates: broadcast::Receiver<SessionUpdate>,
    pub(crate) capture: Arc<FakeCapture>,
    pub(crate) output: Arc<FakeSpeaker>,
    pub(crate) responder: Arc<ScriptedResponder>,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    pub(crate) fn with(
        config: TutorConfig,
        capture: FakeCapture,
        output: FakeSpeaker,
        responder: ScriptedResponder,
    ) -> Self {
        let capture = Arc::new(capture);
        let output = Arc::new(output);
        let responder = Arc::new(responder);
        let (sink, inbox) = EventSink::channel();
        let (update_tx, updates) = broadcast::channel(256);
        let mut orchestrator = TurnOrchestrator::new(
            &config,
            capture.clone(),
            output.clone(),
            responder.clone(),
            sink,
            update_tx,
        );
        orchestrator.start();

        Self {
            orchestrator,
            updates,
            capture,
            output,
            responder,
            inbox,
        }
    }

    /// Quiet start: no greeting playback, no auto-listen.
    pub(crate) fn quiet(responder: ScriptedResponder) -> Self {
        Self::with(
            TutorConfig {
                speak_greeting: false,
                auto_listen: false,
                ..TutorConfig::default()
            },
            FakeCapture::default(),
            FakeSpeaker::default(),
            responder,
        )
    }

    /// Lets spawned tasks run and feeds everything they posted to the
    /// orchestrator, until nothing new arrives.
    pub(crate) async fn pump(&mut self) {
        loop {
            settle().await;
            let mut progressed = false;
            while let Ok(event) = self.inbox.try_recv() {
                self.orchestrator.handle(event);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    pub(crate) async fn advance(&mut self, duration: Duration) {
        tokio::time::advance(duration).await;
        self.pump().await;
    }

    /// Speaks `text` through the fake microphone and submits it.
    pub(crate) async fn say(&mut self, text: &str) {
        self.orchestrator
            .toggle_listening()
            .expect("start listening");
        assert!(self.capture.push(ResultSegment::final_result(0, text)));
        self.pump().await;
        self.orchestrator
            .toggle_listening()
            .expect("stop listening");
        self.pump().await;
    }

    pub(crate) fn updates(&mut self) -> Vec<SessionUpdate> {
        drain(&mut self.updates)
    }
}
