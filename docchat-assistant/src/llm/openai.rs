//! OpenAI-compatible chat completions (DeepSeek)

use super::{GenerationParams, LlmProvider, api_error};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Any endpoint speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new<S: Into<String>>(name: S, api_key: S, base_url: S, model: S) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            params: GenerationParams::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn deepseek<S: Into<String>>(api_key: S, model: S) -> Self {
        Self {
            name: "deepseek".to_string(),
            api_key: api_key.into(),
            base_url: DEEPSEEK_BASE_URL.to_string(),
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
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            stream: false,
        };

        debug!("Calling {} model {}", self.name, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| LlmError::empty_response(self.name.clone()))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}
