//! Anthropic Messages API

use super::{GenerationParams, LlmProvider, api_error};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Claude models through `POST /v1/messages`.
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new<S: Into<String>>(api_key: S, model: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            params: GenerationParams::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url<S: Into<String>>(self, base_url: S) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..self
        }
    }

    pub fn with_params(self, params: GenerationParams) -> Self {
        Self { params, ..self }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: user_content,
            }],
        };

        debug!("Calling Anthropic model {}", self.model);
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(LlmError::empty_response("anthropic"));
        }
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
