use thiserror::Error;

use crate::orchestrator::types::{Capability, RetryRejection};
use crate::speech::types::DeviceError;

/// Result of a rejected command. A rejected command leaves the session unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{} is not available on this device", .0.as_str())]
    CapabilityUnavailable(Capability),
    #[error("a response is already being prepared")]
    ResponseInFlight,
    #[error("cannot retry turn: {0}")]
    InvalidRetryTarget(RetryRejection),
    #[error("command not allowed while {state}")]
    InvalidState { state: &'static str },
    #[error("message is empty")]
    EmptyMessage,
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("session is closed")]
    SessionClosed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("responder API key is not configured")]
    MissingApiKey,
    #[error("responder returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("responder transport failure: {0}")]
    Transport(String),
    #[error("responder reply could not be decoded: {0}")]
    Decode(String),
    #[error("responder returned an empty reply")]
    EmptyReply,
}

impl ResponderError {
    pub fn code(&self) -> &'static str {
        match self {
            ResponderError::MissingApiKey => "missing_api_key",
            ResponderError::Http { .. } => "http",
            ResponderError::Transport(_) => "transport",
            ResponderError::Decode(_) => "decode",
            ResponderError::EmptyReply => "empty_reply",
        }
    }
}
