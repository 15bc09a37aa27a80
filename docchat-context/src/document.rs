//! Document-level chunkers that attach provenance to every chunk.

use crate::chunker::{Chunker, ChunkingMethod, ChunkingParams};
use crate::error::Result;
use crate::reader::{self, DocumentFormat};
use serde::Serialize;
use std::path::Path;

/// A retrieval unit cut from one source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Text that gets embedded and returned as context
    pub text: String,
    /// Basename of the source file
    pub source_file: String,
    /// 1-based page or window number, or 0-based chunk index for token strategies
    pub page_or_index: usize,
    /// First 16 hex characters of the blake3 hash of the chunk content
    pub content_hash: String,
    /// Topic (collection) the chunk belongs to, if any
    pub topic: Option<String>,
}

impl Chunk {
    pub fn new(text: String, source_file: &str, page_or_index: usize) -> Self {
        let content_hash = content_hash(&text);
        Self {
            text,
            source_file: source_file.to_string(),
            page_or_index,
            content_hash,
            topic: None,
        }
    }

    pub fn with_topic(self, topic: Option<String>) -> Self {
        Self { topic, ..self }
    }
}

/// Short content hash used for identity and deduplication checks.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().as_str()[..16].to_string()
}

/// Splits a file on disk into [`Chunk`]s.
pub trait DocumentChunker: Send + Sync {
    fn chunk_document(&self, path: &Path) -> Result<Vec<Chunk>>;
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// One chunk per non-empty PDF page.
///
/// The page text is hashed before the `Source:`/`Page:` trailer is appended,
/// so the hash identifies the page content alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageChunker;

impl PageChunker {
    pub fn new() -> Self {
        Self
    }

    /// Build chunks from already-extracted page texts.
    pub fn chunk_pages(&self, source_file: &str, pages: &[String]) -> Vec<Chunk> {
        pages
            .iter()
            .enumerate()
            .filter_map(|(i, page)| {
                let page_text = page.trim();
                if page_text.is_empty() {
                    return None;
                }
                let page_number = i + 1;
                Some(Chunk {
                    text: format!("{page_text}\n\nSource: {source_file}\nPage: {page_number}"),
                    source_file: source_file.to_string(),
                    page_or_index: page_number,
                    content_hash: content_hash(page_text),
                    topic: None,
                })
            })
            .collect()
    }
}

impl DocumentChunker for PageChunker {
    fn chunk_document(&self, path: &Path) -> Result<Vec<Chunk>> {
        let pages = reader::read_pdf_pages(path)?;
        let chunks = self.chunk_pages(&file_name(path), &pages);
        tracing::debug!(
            "Split {} into {} page chunks ({} pages)",
            path.display(),
            chunks.len(),
            pages.len()
        );
        Ok(chunks)
    }
}

/// Fixed windows of characters, never splitting a UTF-8 character.
#[derive(Debug, Clone, Copy)]
pub struct TextFileChunker {
    chunk_chars: usize,
}

impl Default for TextFileChunker {
    fn default() -> Self {
        Self { chunk_chars: 1000 }
    }
}

impl TextFileChunker {
    pub fn new(chunk_chars: usize) -> Self {
        Self {
            chunk_chars: chunk_chars.max(1),
        }
    }

    pub fn chunk_str(&self, source_file: &str, text: &str) -> Vec<Chunk> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .step_by(self.chunk_chars)
            .chain(std::iter::once(text.len()))
            .collect();

        boundaries
            .windows(2)
            .enumerate()
            .map(|(i, w)| Chunk::new(text[w[0]..w[1]].to_string(), source_file, i + 1))
            .collect()
    }
}

impl DocumentChunker for TextFileChunker {
    fn chunk_document(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = reader::read_document(path)?;
        Ok(self.chunk_str(&file_name(path), &text))
    }
}

/// Runs a [`ChunkingMethod`] over the whole document text.
///
/// Chunk indices are 0-based.
#[derive(Debug, Clone)]
pub struct StrategyChunker {
    chunker: Chunker,
    method: ChunkingMethod,
    params: ChunkingParams,
}

impl StrategyChunker {
    pub fn new(chunker: Chunker, method: ChunkingMethod, params: ChunkingParams) -> Self {
        Self {
            chunker,
            method,
            params,
        }
    }

    pub fn method(&self) -> ChunkingMethod {
        self.method
    }

    pub fn chunk_str(&self, source_file: &str, text: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .chunker
            .chunk_text(text, self.method, &self.params)?
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .enumerate()
            .map(|(i, chunk)| Chunk::new(chunk, source_file, i))
            .collect())
    }
}

impl DocumentChunker for StrategyChunker {
    fn chunk_document(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = reader::read_document(path)?;
        self.chunk_str(&file_name(path), &text)
    }
}

/// Chunker for a given file: pages for PDFs, `fallback` for everything else.
pub fn chunk_file(path: &Path, fallback: &dyn DocumentChunker) -> Result<Vec<Chunk>> {
    match DocumentFormat::from_path(path)? {
        DocumentFormat::Pdf => PageChunker.chunk_document(path),
        DocumentFormat::Text | DocumentFormat::Csv => fallback.chunk_document(path),
    }
}
