//! Error types for document reading and chunking

use std::path::PathBuf;

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors raised while reading source documents or splitting them into chunks.
///
/// Empty input is never an error: every chunker returns an empty sequence for it.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The file extension has no reader
    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    /// The referenced file does not exist
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    /// Chunking parameters that cannot produce a valid window
    #[error("Invalid chunking parameters: {message}")]
    InvalidParameters { message: String },

    /// PDF text extraction failed
    #[error("Failed to extract text from {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    /// Malformed CSV content
    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    /// Tokenizer, sentence splitter or other NLP collaborator failure
    #[error("NLP collaborator failed: {message}")]
    Nlp { message: String },

    /// IO errors when reading documents
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ContextError {
    /// Create an unsupported-format error from a file extension (without the dot).
    pub fn unsupported<S: Into<String>>(extension: S) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }

    /// Create an invalid-parameters error with a custom message.
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Wrap a failure reported by an NLP collaborator.
    pub fn nlp<S: Into<String>>(message: S) -> Self {
        Self::Nlp {
            message: message.into(),
        }
    }
}
