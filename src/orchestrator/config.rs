use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::types::{Difficulty, Topic};
use crate::speech::types::{CaptureConfig, OutputConfig};

pub(crate) const DEFAULT_CHAT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
pub(crate) const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    #[default]
    PhraseTable,
    ChatCompletion,
}

impl FromStr for ResponderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" | "phrase_table" | "mock" => Ok(ResponderKind::PhraseTable),
            "chat" | "chat_completion" | "deepseek" => Ok(ResponderKind::ChatCompletion),
            other => anyhow::bail!("unknown responder `{other}`"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 1.3,
            max_tokens: 200,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    /// Daily-rolling log files are written here when set.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub auto_listen: bool,
    pub auto_listen_delay_ms: u64,
    pub speak_greeting: bool,
    pub update_buffer: usize,
    pub responder: ResponderKind,
    pub chat: ChatConfig,
    pub log: LogConfig,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            output: OutputConfig::default(),
            topic: Topic::default(),
            difficulty: Difficulty::default(),
            auto_listen: true,
            auto_listen_delay_ms: 750,
            speak_greeting: true,
            update_buffer: 64,
            responder: ResponderKind::default(),
            chat: ChatConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl TutorConfig {
    pub fn auto_listen_delay(&self) -> Duration {
        Duration::from_millis(self.auto_listen_delay_ms)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays `HABLA_*` variables (and `DEEPSEEK_API_KEY`) on the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("HABLA_TOPIC") {
            config.topic = value.parse().context("HABLA_TOPIC")?;
        }
        if let Some(value) = get("HABLA_DIFFICULTY") {
            config.difficulty = value.parse().context("HABLA_DIFFICULTY")?;
        }
        if let Some(value) = get("HABLA_AUTO_LISTEN") {
            config.auto_listen = parse_flag(&value).context("HABLA_AUTO_LISTEN")?;
        }
        if let Some(value) = get("HABLA_AUTO_LISTEN_DELAY_MS") {
            config.auto_listen_delay_ms = value
                .trim()
                .parse()
                .context("HABLA_AUTO_LISTEN_DELAY_MS")?;
        }
        if let Some(value) = get("HABLA_SPEAK_GREETING") {
            config.speak_greeting = parse_flag(&value).context("HABLA_SPEAK_GREETING")?;
        }
        if let Some(value) = get("HABLA_LANGUAGE") {
            config.capture.lang = value.trim().to_string();
            config.output.lang = value.trim().to_string();
        }
        if let Some(value) = get("HABLA_VOICE_PREFIX") {
            config.output.voice_prefix = value.trim().to_string();
        }
        if let Some(value) = get("HABLA_SPEECH_RATE") {
            config.output.rate = value.trim().parse().context("HABLA_SPEECH_RATE")?;
        }
        if let Some(value) = get("HABLA_RESPONDER") {
            config.responder = value.parse().context("HABLA_RESPONDER")?;
        }
        if let Some(value) = get("HABLA_RESPONDER_ENDPOINT") {
            config.chat.endpoint = value.trim().to_string();
        }
        if let Some(value) = get("HABLA_RESPONDER_MODEL") {
            config.chat.model = value.trim().to_string();
        }
        config.chat.api_key = get("DEEPSEEK_API_KEY").map(|key| key.trim().to_string());
        if let Some(value) = get("HABLA_LOG_JSON") {
            config.log.json = parse_flag(&value).context("HABLA_LOG_JSON")?;
        }
        config.log.dir = get("HABLA_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got `{other}`"),
    }
}
