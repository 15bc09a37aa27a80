//! Hosted language model providers
//!
//! Everything above this module talks to a model through [`LlmProvider`]: one
//! system prompt and one user message in, plain text out. The concrete
//! provider is picked by [`LlmConfig::provider`].
//!
//! ## Providers
//!
//! - **AnthropicProvider**: Messages API (`/v1/messages`)
//! - **GeminiProvider**: `generateContent`, system prompt folded into the user turn
//! - **OpenAiCompatibleProvider**: `/chat/completions`, used for DeepSeek

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// A chat model that turns a system prompt and one user message into text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_content: &str)
    -> Result<String, LlmError>;

    /// Short provider name used in logs
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;
}

/// Which hosted model family to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Anthropic,
    Gemini,
    DeepSeek,
}

impl LlmProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            LlmProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            LlmProviderKind::Gemini => "gemini-2.0-flash",
            LlmProviderKind::DeepSeek => "deepseek-chat",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            LlmProviderKind::Gemini => "GOOGLE_API_KEY",
            LlmProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmProviderKind::Anthropic => "anthropic",
            LlmProviderKind::Gemini => "gemini",
            LlmProviderKind::DeepSeek => "deepseek",
        };
        f.write_str(name)
    }
}

impl FromStr for LlmProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProviderKind::Anthropic),
            "gemini" | "google" => Ok(LlmProviderKind::Gemini),
            "deepseek" => Ok(LlmProviderKind::DeepSeek),
            other => Err(LlmError::configuration(format!(
                "unknown LLM provider '{other}'"
            ))),
        }
    }
}

/// The `[llm]` table of the application config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    /// Model name; the provider's default when unset
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Override the API endpoint, e.g. for a proxy
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            provider: LlmProviderKind::default(),
            model: None,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn with_provider(self, provider: LlmProviderKind) -> Self {
        Self { provider, ..self }
    }

    pub fn with_model<S: Into<String>>(self, model: S) -> Self {
        Self {
            model: Some(model.into()),
            ..self
        }
    }

    pub fn with_base_url<S: Into<String>>(self, base_url: S) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if self.max_tokens == 0 {
            return Err(LlmError::configuration("max_tokens must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::configuration(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Build the configured provider, reading its API key from the environment.
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let var = config.provider.api_key_var();
    let api_key = std::env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| LlmError::configuration(format!("{var} is not set")))?;
    create_llm_with_key(config, api_key)
}

/// Build the configured provider with an explicit API key.
pub fn create_llm_with_key(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    config.validate()?;
    let model = config.model_name().to_string();
    let params = config.params();
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key, model).with_params(params);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
        LlmProviderKind::Gemini => {
            let mut provider = GeminiProvider::new(api_key, model).with_params(params);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
        LlmProviderKind::DeepSeek => {
            let mut provider = OpenAiCompatibleProvider::deepseek(api_key, model).with_params(params);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}

/// Read an error response body, keeping the status.
pub(crate) async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    LlmError::Api { status, body }
}
