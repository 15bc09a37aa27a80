//! # docchat-context
//!
//! Turns source documents into retrieval-sized chunks.
//!
//! ## Key Modules
//!
//! - [`chunker`]: token and sentence based strategies ([`ChunkingMethod`])
//! - [`document`]: file-level chunkers that attach provenance ([`Chunk`])
//! - [`reader`]: text, PDF and CSV readers
//! - [`nlp`]: tokenizer, sentence, entity and topic collaborators
//!
//! ## Quick Start
//!
//! ```no_run
//! use docchat_context::{Chunker, ChunkingMethod, ChunkingParams, StrategyChunker, chunk_file};
//! use std::path::Path;
//!
//! # fn example() -> docchat_context::Result<()> {
//! let strategy = StrategyChunker::new(
//!     Chunker::new(),
//!     ChunkingMethod::Sentence,
//!     ChunkingParams::default(),
//! );
//! // PDFs are split per page, everything else by the strategy
//! for chunk in chunk_file(Path::new("Docs/lecture.txt"), &strategy)? {
//!     println!("{} #{}: {}", chunk.source_file, chunk.page_or_index, chunk.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod document;
pub mod error;
pub mod nlp;
pub mod reader;

pub use chunker::{Chunker, ChunkingMethod, ChunkingParams};
pub use document::{
    Chunk, DocumentChunker, PageChunker, StrategyChunker, TextFileChunker, chunk_file,
    content_hash,
};
pub use error::{ContextError, Result};
pub use reader::{DocumentFormat, SUPPORTED_EXTENSIONS, is_supported, read_document};
