//! Remote chat-completions responder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::orchestrator::config::ChatConfig;
use crate::orchestrator::error::ResponderError;
use crate::orchestrator::traits::{Responder, ResponderReply, ResponderRequest};
use crate::session::history::HistoryEntry;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [HistoryEntry],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

pub struct ChatCompletionResponder {
    agent: ureq::Agent,
    config: ChatConfig,
}

impl std::fmt::Debug for ChatCompletionResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionResponder")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("has_api_key", &self.config.api_key.is_some())
            .finish()
    }
}

impl ChatCompletionResponder {
    pub fn new(config: ChatConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self { agent, config }
    }

    fn call(
        agent: &ureq::Agent,
        config: &ChatConfig,
        api_key: &str,
        messages: &[HistoryEntry],
    ) -> Result<String, ResponderError> {
        let body = ChatRequestBody {
            model: &config.model,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = agent
            .post(&config.endpoint)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(&body)
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => ResponderError::Http {
                    status,
                    message: response.status_text().to_string(),
                },
                ureq::Error::Transport(transport) => {
                    ResponderError::Transport(transport.to_string())
                }
            })?;

        let parsed: ChatResponseBody = response
            .into_json()
            .map_err(|err| ResponderError::Decode(err.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ResponderError::EmptyReply);
        }
        Ok(content)
    }
}

#[async_trait]
impl Responder for ChatCompletionResponder {
    async fn respond(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or(ResponderError::MissingApiKey)?;

        let mut messages = request.history.clone();
        messages.push(HistoryEntry::user(request.user_text.clone()));

        let agent = self.agent.clone();
        let config = self.config.clone();
        debug!(
            target: "responder",
            endpoint = %config.endpoint,
            messages = messages.len(),
            "requesting chat completion"
        );

        let reply = tokio::task::spawn_blocking(move || {
            Self::call(&agent, &config, &api_key, &messages)
        })
        .await
        .map_err(|err| ResponderError::Transport(err.to_string()))?;

        match reply {
            Ok(text) => Ok(ResponderReply::extending(&request, text)),
            Err(err) => {
                warn!(target: "responder", %err, code = err.code(), "chat completion failed");
                Err(err)
            }
        }
    }

    fn name(&self) -> &'static str {
        "chat_completion"
    }
}
