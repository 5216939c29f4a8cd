use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::tutor";
pub(crate) const EVENT_EXCHANGE_COMPLETED: &str = "exchange_completed";
pub(crate) const EVENT_EXCHANGE_FAILED: &str = "exchange_failed";
pub(crate) const EVENT_TURN_RETRIED: &str = "turn_retried";
pub(crate) const EVENT_OUTPUT_RETRY: &str = "output_retry";
pub(crate) const EVENT_CAPTURE_RESTART: &str = "capture_restart";

/// A learner turn got a reply that was committed to history.
#[derive(Debug, Serialize)]
pub struct ExchangeCompletedEvent<'a> {
    pub turn_id: &'a str,
    pub responder: &'static str,
    pub reply_chars: usize,
    pub latency_ms: u64,
    pub history_len: usize,
}

/// The responder failed, on a new exchange or on a retry.
#[derive(Debug, Serialize)]
pub struct ExchangeFailedEvent<'a> {
    pub responder: &'static str,
    /// Stable error code from `ResponderError::code`.
    pub code: &'static str,
    pub latency_ms: u64,
    pub is_retry: bool,
    /// Retried turn, when `is_retry` is set.
    pub turn_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct TurnRetriedEvent<'a> {
    pub turn_id: &'a str,
    pub rewound: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct OutputRetryEvent<'a> {
    pub utterance: u64,
    pub reason: &'a str,
    pub delay_ms: u64,
}

/// Capture ended on its own and was reopened.
#[derive(Debug, Serialize)]
pub struct CaptureRestartEvent {
    pub stream: u64,
    pub restarts: u32,
    pub transcript_chars: usize,
}

fn emit<T: Serialize>(event_name: &'static str, event: &T) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(
                target: TARGET,
                event = event_name,
                %err,
                "failed to encode tutor event"
            );
            None
        }
    }
}

pub fn record_exchange_completed(
    turn_id: &str,
    responder: &'static str,
    reply_chars: usize,
    latency: Duration,
    history_len: usize,
) {
    let event = ExchangeCompletedEvent {
        turn_id,
        responder,
        reply_chars,
        latency_ms: duration_to_ms(latency),
        history_len,
    };

    if let Some(payload) = emit(EVENT_EXCHANGE_COMPLETED, &event) {
        info!(
            target: TARGET,
            event = EVENT_EXCHANGE_COMPLETED,
            turn_id = event.turn_id,
            responder = event.responder,
            latency_ms = event.latency_ms,
            history_len = event.history_len,
            payload = %payload
        );
    }
}

pub fn record_exchange_failed(
    responder: &'static str,
    code: &'static str,
    latency: Duration,
    retried_turn: Option<&str>,
) {
    let event = ExchangeFailedEvent {
        responder,
        code,
        latency_ms: duration_to_ms(latency),
        is_retry: retried_turn.is_some(),
        turn_id: retried_turn,
    };

    if let Some(payload) = emit(EVENT_EXCHANGE_FAILED, &event) {
        warn!(
            target: TARGET,
            event = EVENT_EXCHANGE_FAILED,
            responder = event.responder,
            code = event.code,
            latency_ms = event.latency_ms,
            is_retry = event.is_retry,
            payload = %payload
        );
    }
}

pub fn record_turn_retried(turn_id: &str, rewound: bool, latency: Duration) {
    let event = TurnRetriedEvent {
        turn_id,
        rewound,
        latency_ms: duration_to_ms(latency),
    };

    if let Some(payload) = emit(EVENT_TURN_RETRIED, &event) {
        info!(
            target: TARGET,
            event = EVENT_TURN_RETRIED,
            turn_id = event.turn_id,
            rewound = event.rewound,
            payload = %payload
        );
    }
}

pub fn record_output_retry(utterance: u64, reason: &str, delay: Duration) {
    let event = OutputRetryEvent {
        utterance,
        reason,
        delay_ms: duration_to_ms(delay),
    };

    if let Some(payload) = emit(EVENT_OUTPUT_RETRY, &event) {
        info!(
            target: TARGET,
            event = EVENT_OUTPUT_RETRY,
            utterance = event.utterance,
            reason = event.reason,
            payload = %payload
        );
    }
}

pub fn record_capture_restart(stream: u64, restarts: u32, transcript_chars: usize) {
    let event = CaptureRestartEvent {
        stream,
        restarts,
        transcript_chars,
    };

    if let Some(payload) = emit(EVENT_CAPTURE_RESTART, &event) {
        info!(
            target: TARGET,
            event = EVENT_CAPTURE_RESTART,
            stream = event.stream,
            restarts = event.restarts,
            payload = %payload
        );
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
