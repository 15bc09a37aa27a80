//! Error types for the embedding system

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// # Error Categories
///
/// - **Configuration Errors**: unknown model names or invalid settings
/// - **Initialization Errors**: failures while loading a model
/// - **Runtime Errors**: problems during embedding generation
/// - **External Errors**: failures from dependencies
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: anyhow::Error,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: anyhow::Error,
    },

    /// A previous embedding call panicked while holding the model
    #[error("Embedding model lock poisoned")]
    LockPoisoned,

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Create a model initialization error.
    pub fn model_init(source: anyhow::Error) -> Self {
        Self::ModelInitialization { source }
    }

    /// Create an embedding generation error.
    pub fn embedding_gen(source: anyhow::Error) -> Self {
        Self::EmbeddingGeneration { source }
    }

    /// Create an invalid configuration error with a custom message.
    ///
    /// # Arguments
    /// * `message` - What is wrong with the configuration
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
