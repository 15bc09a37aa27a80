//! Error types for the chat assistant

use docchat_retriever::StoreError;

/// Result type for assistant operations.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Failures talking to a hosted language model.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Missing API key, unknown provider, or unusable parameters
    #[error("LLM configuration error: {message}")]
    Configuration { message: String },

    /// Transport failure before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider answered successfully but without any text
    #[error("{provider} returned no text")]
    EmptyResponse { provider: String },
}

impl LlmError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn empty_response<S: Into<String>>(provider: S) -> Self {
        Self::EmptyResponse {
            provider: provider.into(),
        }
    }
}

/// Error type for the pipeline, the evaluator and configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] docchat_embed::EmbedError),

    /// Configuration file could not be used
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The evaluated collection holds no documents
    #[error("No documents available for evaluation in collection '{collection}'")]
    NoDocuments { collection: String },

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
