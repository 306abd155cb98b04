//! Free-form text generation for controller replies.
//!
//! The language model runs out of process (typically Ollama). This module only
//! defines the boundary: a [`TextGenerator`] trait, the [`TextGeneration`]
//! capability that is injected into the response generator, and an
//! implementation for any OpenAI-compatible chat endpoint.

use crate::phase::Phase;
use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Radio phraseology used for replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phraseology {
    #[default]
    Military,
    Civilian,
}

impl fmt::Display for Phraseology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phraseology::Military => write!(f, "military"),
            Phraseology::Civilian => write!(f, "civilian"),
        }
    }
}

impl FromStr for Phraseology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "military" => Ok(Phraseology::Military),
            "civilian" => Ok(Phraseology::Civilian),
            other => Err(format!("unknown phraseology '{}'", other)),
        }
    }
}

/// Context the generator uses to shape its system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleContext {
    pub phraseology: Phraseology,
    pub callsign: String,
    pub phase: Phase,
}

impl StyleContext {
    /// Renders the system prompt that frames the controller persona.
    pub fn system_prompt(&self) -> String {
        let style = match self.phraseology {
            Phraseology::Military => "US military",
            Phraseology::Civilian => "FAA civilian",
        };
        format!(
            "You are an Air Traffic Controller. Aircraft: {}. Current State: {}. \
             Respond using proper {} ATC phraseology. Be concise (1-2 sentences).",
            self.callsign, self.phase, style
        )
    }
}

/// A client for an external free-form text generator.
///
/// Implementations may fail or be unreachable; callers are expected to fall
/// back to deterministic output rather than surface the error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Cheap health check. Must not block for long.
    async fn available(&self) -> bool;

    /// Produces a reply for `prompt`, shaped by `style`.
    async fn generate(&self, prompt: &str, style: &StyleContext) -> Result<String>;
}

/// Whether a text generator is wired in.
#[derive(Clone, Default)]
pub enum TextGeneration {
    #[default]
    Unavailable,
    Available(Arc<dyn TextGenerator>),
}

impl TextGeneration {
    pub fn available(generator: impl TextGenerator + 'static) -> Self {
        TextGeneration::Available(Arc::new(generator))
    }
}

impl fmt::Debug for TextGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextGeneration::Unavailable => write!(f, "Unavailable"),
            TextGeneration::Available(_) => write!(f, "Available(..)"),
        }
    }
}

/// Settings for [`OpenAiCompatibleGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Base URL of the OpenAI-compatible API, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Total attempts per reply, including the first.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    /// URL polled by [`TextGenerator::available`].
    pub health_url: String,
    pub health_ttl: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.2:3b".to_string(),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            health_url: "http://localhost:11434/api/tags".to_string(),
            health_ttl: Duration::from_secs(5),
            temperature: 0.3,
            max_tokens: 100,
        }
    }
}

impl GeneratorSettings {
    /// Derives the Ollama health URL from an OpenAI-style base URL by dropping
    /// a trailing `/v1`.
    pub fn health_url_for(base_url: &str) -> String {
        let root = base_url.trim_end_matches('/');
        let root = root.strip_suffix("/v1").unwrap_or(root);
        format!("{}/api/tags", root)
    }
}

/// A [`TextGenerator`] for any OpenAI-compatible chat completion API.
pub struct OpenAiCompatibleGenerator {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    settings: GeneratorSettings,
    health: Mutex<Option<(Instant, bool)>>,
}

impl OpenAiCompatibleGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(&settings.base_url);
        if let Some(key) = &settings.api_key {
            config = config.with_api_key(key);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            client: Client::with_config(config),
            http,
            settings,
            health: Mutex::new(None),
        }
    }

    async fn check_health(&self) -> bool {
        match self.http.get(&self.settings.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Text generator health check failed");
                false
            }
        }
    }

    async fn chat_once(&self, prompt: &str, style: &StyleContext) -> Result<String> {
        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(style.system_prompt())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .as_ref()
            .context("No content in LLM response")?
            .trim()
            .to_string();

        if answer.is_empty() {
            return Err(anyhow!("LLM returned an empty reply"));
        }
        Ok(answer)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn available(&self) -> bool {
        let mut cached = self.health.lock().await;
        if let Some((checked_at, is_up)) = *cached {
            if checked_at.elapsed() < self.settings.health_ttl {
                return is_up;
            }
        }
        let is_up = self.check_health().await;
        *cached = Some((Instant::now(), is_up));
        is_up
    }

    async fn generate(&self, prompt: &str, style: &StyleContext) -> Result<String> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = anyhow!("no attempts made");

        for attempt in 1..=attempts {
            match self.chat_once(prompt, style).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(attempt, error = %e, "Chat attempt failed");
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }

        Err(last_error.context(format!("All {} chat attempts failed", attempts)))
    }
}
