//! Tutor session: one event loop per conversation.

pub mod history;
pub mod lifecycle;
pub mod turn;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::config::TutorConfig;
use crate::orchestrator::engine::{Flow, TurnOrchestrator};
use crate::orchestrator::error::SessionError;
use crate::orchestrator::traits::Responder;
use crate::orchestrator::types::{
    Difficulty, Reply, SessionCommand, SessionEvent, SessionSnapshot, SessionUpdate, Topic,
    TurnState,
};
use crate::session::lifecycle::{SessionLifecycleUpdate, StartedPayload};
use crate::speech::traits::{CaptureDevice, EventSink, OutputDevice};

const TARGET: &str = "tutor_session";
const LIFECYCLE_BUFFER: usize = 8;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Receivers created before the loop starts, so nothing it emits is missed.
pub struct SessionStreams {
    pub updates: broadcast::Receiver<SessionUpdate>,
    pub lifecycle: broadcast::Receiver<SessionLifecycleUpdate>,
}

/// Handle to a running conversation. Dropping it aborts the loop, which
/// cancels capture and output.
pub struct TutorSession {
    session_id: String,
    sink: EventSink,
    update_tx: broadcast::Sender<SessionUpdate>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
    worker: Option<JoinHandle<()>>,
}

impl TutorSession {
    pub fn spawn(
        config: TutorConfig,
        capture: Arc<dyn CaptureDevice>,
        output: Arc<dyn OutputDevice>,
        responder: Arc<dyn Responder>,
    ) -> (Self, SessionStreams) {
        let session_id = format!("session-{}", NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
        let (update_tx, updates) = broadcast::channel(config.update_buffer.max(1));
        let (lifecycle_tx, lifecycle) = broadcast::channel(LIFECYCLE_BUFFER);
        let (tx, inbox) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);

        let orchestrator = TurnOrchestrator::new(
            &config,
            capture,
            output,
            responder,
            sink.clone(),
            update_tx.clone(),
        );
        let worker = tokio::spawn(run_session(
            session_id.clone(),
            orchestrator,
            inbox,
            lifecycle_tx.clone(),
        ));

        let session = Self {
            session_id,
            sink,
            update_tx,
            lifecycle_tx,
            worker: Some(worker),
        };
        (session, SessionStreams { updates, lifecycle })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.update_tx.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleUpdate> {
        self.lifecycle_tx.subscribe()
    }

    pub async fn toggle_listening(&self) -> Result<TurnState, SessionError> {
        self.request(SessionCommand::ToggleListening).await
    }

    pub async fn send_text<S: Into<String>>(&self, text: S) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| SessionCommand::SendText(text, reply))
            .await
    }

    pub async fn skip(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Skip).await
    }

    pub async fn retry_last_speech(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::RetryLastSpeech).await
    }

    pub async fn retry_turn<S: Into<String>>(&self, turn_id: S) -> Result<(), SessionError> {
        let turn_id = turn_id.into();
        self.request(|reply| SessionCommand::RetryTurn(turn_id, reply))
            .await
    }

    pub async fn set_auto_listen(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetAutoListen(enabled, reply))
            .await
    }

    pub async fn set_topic(&self, topic: Topic) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetTopic(topic, reply))
            .await
    }

    pub async fn set_difficulty(&self, difficulty: Difficulty) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetDifficulty(difficulty, reply))
            .await
    }

    pub async fn clear_error(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::ClearError).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Snapshot).await
    }

    /// Cancels capture and output, then waits for the loop to exit.
    pub async fn teardown(mut self) -> Result<(), SessionError> {
        let result = self.request(SessionCommand::Teardown).await;
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                debug!(target: TARGET, %err, "session loop ended abnormally");
            }
        }
        result
    }

    async fn request<T, F>(&self, make: F) -> Result<T, SessionError>
    where
        F: FnOnce(Reply<T>) -> SessionCommand,
    {
        let (reply, response) = oneshot::channel();
        if !self.sink.post(SessionEvent::Command(make(reply))) {
            return Err(SessionError::SessionClosed);
        }
        response.await.map_err(|_| SessionError::SessionClosed)?
    }
}

impl Drop for TutorSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn run_session(
    session_id: String,
    mut orchestrator: TurnOrchestrator,
    mut inbox: mpsc::UnboundedReceiver<SessionEvent>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
) {
    orchestrator.start();
    let snapshot = orchestrator.snapshot();
    let _ = lifecycle_tx.send(SessionLifecycleUpdate::started(
        session_id.as_str(),
        StartedPayload {
            capture_available: snapshot.capture_available,
            output_available: snapshot.output_available,
            topic: snapshot.topic,
            difficulty: snapshot.difficulty,
        },
    ));
    info!(target: TARGET, session_id = %session_id, "session started");

    while let Some(event) = inbox.recv().await {
        if orchestrator.handle(event) == Flow::Stop {
            break;
        }
    }

    let _ = lifecycle_tx.send(SessionLifecycleUpdate::torn_down(
        session_id.as_str(),
        orchestrator.turns().len(),
        orchestrator.history().completed_exchanges(),
    ));
    info!(target: TARGET, session_id = %session_id, "session closed");
}
