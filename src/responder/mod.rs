//! Tutor reply sources.

#[cfg(feature = "chat-responder")]
pub mod chat;
pub mod prompt;
pub mod table;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::orchestrator::config::{ResponderKind, TutorConfig};
use crate::orchestrator::traits::Responder;

#[cfg(feature = "chat-responder")]
pub use chat::ChatCompletionResponder;
pub use crate::orchestrator::error::ResponderError;
pub use prompt::system_prompt;
pub use table::PhraseTableResponder;

/// Builds the responder selected in `config`.
pub fn from_config(config: &TutorConfig) -> Result<Arc<dyn Responder>> {
    let responder: Arc<dyn Responder> = match config.responder {
        ResponderKind::PhraseTable => Arc::new(PhraseTableResponder::new()),
        ResponderKind::ChatCompletion => build_chat(config)?,
    };
    info!(target: "responder", responder = responder.name(), "responder ready");
    Ok(responder)
}

#[cfg(feature = "chat-responder")]
fn build_chat(config: &TutorConfig) -> Result<Arc<dyn Responder>> {
    if config.chat.api_key.is_none() {
        tracing::warn!(
            target: "responder",
            "DEEPSEEK_API_KEY is not set; every exchange will fall back to the apology"
        );
    }
    Ok(Arc::new(ChatCompletionResponder::new(config.chat.clone())))
}

#[cfg(not(feature = "chat-responder"))]
fn build_chat(_config: &TutorConfig) -> Result<Arc<dyn Responder>> {
    anyhow::bail!("chat responder requested but the `chat-responder` feature is disabled")
}
