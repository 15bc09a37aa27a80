//! Token- and sentence-based chunking strategies.
//!
//! [`Chunker`] turns one block of text into retrieval-sized strings using one
//! of the [`ChunkingMethod`]s. It never reads files and never attaches
//! metadata; see [`crate::document`] for that.
//!
//! The sentence-aware methods share one packing rule: sentences are appended
//! to the current chunk until the next one would push it over the token
//! budget, at which point the chunk is flushed. A sentence that is larger
//! than the whole budget becomes a chunk of its own and is never split.

use crate::error::{ContextError, Result};
use crate::nlp::{
    CapitalizationEntityRecognizer, EntityRecognizer, KMeansTopicModel, RegexTokenizer,
    RuleSentenceSplitter, SentenceSplitter, TopicModel, Tokenizer,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

/// The available chunking policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingMethod {
    /// Non-overlapping token windows
    FixedLength,
    /// Whole sentences packed up to the token budget
    Sentence,
    /// Token windows overlapping by `stride` tokens
    SlidingWindow,
    /// Sentences grouped by latent topic, then packed
    Topic,
    /// Sentence packing that keeps entity-bearing sentences together
    Entity,
}

impl ChunkingMethod {
    pub const ALL: [ChunkingMethod; 5] = [
        ChunkingMethod::FixedLength,
        ChunkingMethod::Sentence,
        ChunkingMethod::SlidingWindow,
        ChunkingMethod::Topic,
        ChunkingMethod::Entity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingMethod::FixedLength => "fixed_length",
            ChunkingMethod::Sentence => "sentence",
            ChunkingMethod::SlidingWindow => "sliding_window",
            ChunkingMethod::Topic => "topic",
            ChunkingMethod::Entity => "entity",
        }
    }
}

impl fmt::Display for ChunkingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingMethod {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fixed_length" | "fixed" => Ok(ChunkingMethod::FixedLength),
            "sentence" => Ok(ChunkingMethod::Sentence),
            "sliding_window" | "sliding" => Ok(ChunkingMethod::SlidingWindow),
            "topic" => Ok(ChunkingMethod::Topic),
            "entity" => Ok(ChunkingMethod::Entity),
            other => Err(ContextError::invalid_params(format!(
                "unknown chunking method '{other}'"
            ))),
        }
    }
}

/// Parameters shared by all chunking methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingParams {
    /// Token budget per chunk (window size for the window methods)
    pub chunk_size: usize,
    /// Overlap in tokens between consecutive sliding windows
    pub stride: usize,
    /// Topic count for topic-based chunking
    pub num_topics: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            stride: 256,
            num_topics: 5,
        }
    }
}

impl ChunkingParams {
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }

    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }

    pub fn with_num_topics(self, num_topics: usize) -> Self {
        Self { num_topics, ..self }
    }
}

/// Splits text into chunks using pluggable NLP collaborators.
///
/// # Example
///
/// ```
/// use docchat_context::chunker::{Chunker, ChunkingMethod, ChunkingParams};
///
/// let chunker = Chunker::new();
/// let params = ChunkingParams::default().with_chunk_size(9);
/// let chunks = chunker
///     .chunk_text("The sky is blue. Water is wet. Fire is hot.", ChunkingMethod::Sentence, &params)
///     .unwrap();
/// assert_eq!(chunks, vec!["The sky is blue. Water is wet.", "Fire is hot."]);
/// ```
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    splitter: Arc<dyn SentenceSplitter>,
    recognizer: Arc<dyn EntityRecognizer>,
    topic_model: Arc<dyn TopicModel>,
}

impl fmt::Debug for Chunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunker").finish_non_exhaustive()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker {
    /// Chunker backed by the rule-based collaborators in [`crate::nlp`].
    pub fn new() -> Self {
        Self {
            tokenizer: Arc::new(RegexTokenizer::new()),
            splitter: Arc::new(RuleSentenceSplitter::new()),
            recognizer: Arc::new(CapitalizationEntityRecognizer::new()),
            topic_model: Arc::new(KMeansTopicModel::default()),
        }
    }

    pub fn with_tokenizer(self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer, ..self }
    }

    pub fn with_sentence_splitter(self, splitter: Arc<dyn SentenceSplitter>) -> Self {
        Self { splitter, ..self }
    }

    pub fn with_entity_recognizer(self, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self { recognizer, ..self }
    }

    pub fn with_topic_model(self, topic_model: Arc<dyn TopicModel>) -> Self {
        Self {
            topic_model,
            ..self
        }
    }

    /// Dispatch to the strategy named by `method`.
    ///
    /// `FixedLength` ignores `params.stride` and never overlaps;
    /// `SlidingWindow` uses it.
    pub fn chunk_text(
        &self,
        text: &str,
        method: ChunkingMethod,
        params: &ChunkingParams,
    ) -> Result<Vec<String>> {
        tracing::debug!(
            "Chunking {} bytes with method {} (chunk_size={})",
            text.len(),
            method,
            params.chunk_size
        );
        match method {
            ChunkingMethod::FixedLength => self.fixed_length_chunk(text, params.chunk_size, 0),
            ChunkingMethod::Sentence => self.sentence_chunk(text, params.chunk_size),
            ChunkingMethod::SlidingWindow => {
                self.sliding_window_chunk(text, params.chunk_size, params.stride)
            }
            ChunkingMethod::Topic => self.topic_chunk(text, params.num_topics, params.chunk_size),
            ChunkingMethod::Entity => self.entity_chunk(text, params.chunk_size),
        }
    }

    /// Token windows of `chunk_size`, advancing by `chunk_size - stride`.
    ///
    /// The last window may be shorter; it is kept as-is.
    ///
    /// # Errors
    /// [`ContextError::InvalidParameters`] when `chunk_size` is zero or
    /// `stride >= chunk_size`.
    pub fn fixed_length_chunk(
        &self,
        text: &str,
        chunk_size: usize,
        stride: usize,
    ) -> Result<Vec<String>> {
        if chunk_size == 0 {
            return Err(ContextError::invalid_params("chunk_size must be positive"));
        }
        if stride >= chunk_size {
            return Err(ContextError::invalid_params(format!(
                "stride ({stride}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        let tokens = self.tokenizer.encode(text)?;
        let step = chunk_size - stride;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let end = (start + chunk_size).min(tokens.len());
            chunks.push(self.tokenizer.decode(&tokens[start..end])?);
            if end == tokens.len() {
                break;
            }
            start += step;
        }
        Ok(chunks)
    }

    /// Whole sentences packed greedily up to `max_tokens`.
    pub fn sentence_chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<String>> {
        let sentences = self.sentence_texts(text);
        let mut packer = Packer::new(max_tokens);
        for sentence in sentences {
            let tokens = self.tokenizer.count_tokens(sentence)?;
            packer.push(sentence, tokens);
        }
        Ok(packer.finish())
    }

    /// Overlapping token windows; `stride` is the overlap between neighbours.
    pub fn sliding_window_chunk(
        &self,
        text: &str,
        window_size: usize,
        stride: usize,
    ) -> Result<Vec<String>> {
        self.fixed_length_chunk(text, window_size, stride)
    }

    /// Runs of consecutive sentences sharing a topic, each packed up to `chunk_size`.
    ///
    /// A change of topic always starts a new chunk.
    pub fn topic_chunk(
        &self,
        text: &str,
        num_topics: usize,
        chunk_size: usize,
    ) -> Result<Vec<String>> {
        let sentences = self.sentence_texts(text);
        let topics = self.topic_model.assign(&sentences, num_topics);
        if topics.len() != sentences.len() {
            return Err(ContextError::nlp(format!(
                "topic model labelled {} of {} sentences",
                topics.len(),
                sentences.len()
            )));
        }

        let mut packer = Packer::new(chunk_size);
        let mut current_topic = None;
        for (sentence, topic) in sentences.into_iter().zip(topics) {
            if current_topic.is_some_and(|t| t != topic) {
                packer.flush();
            }
            current_topic = Some(topic);
            let tokens = self.tokenizer.count_tokens(sentence)?;
            packer.push(sentence, tokens);
        }
        Ok(packer.finish())
    }

    /// Sentence packing that keeps each run of entity-bearing sentences in one chunk.
    ///
    /// When a run would not fit after the material already collected, that
    /// material is flushed first so the run starts a fresh chunk.
    pub fn entity_chunk(&self, text: &str, max_tokens: usize) -> Result<Vec<String>> {
        let spans = self.splitter.sentences(text);
        let entities = self.recognizer.entities(text);
        let has_entity: Vec<bool> = spans
            .iter()
            .map(|s| entities.iter().any(|e| overlaps(s, e)))
            .collect();
        let counts = spans
            .iter()
            .map(|s| self.tokenizer.count_tokens(&text[s.clone()]))
            .collect::<Result<Vec<_>>>()?;

        let mut packer = Packer::new(max_tokens);
        for (i, span) in spans.iter().enumerate() {
            let run_starts = has_entity[i] && (i == 0 || !has_entity[i - 1]);
            if run_starts {
                let run_tokens: usize = (i..spans.len())
                    .take_while(|&j| has_entity[j])
                    .map(|j| counts[j])
                    .sum();
                if packer.would_overflow(run_tokens) {
                    packer.flush();
                }
            }
            packer.push(&text[span.clone()], counts[i]);
        }
        Ok(packer.finish())
    }

    fn sentence_texts<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.splitter
            .sentences(text)
            .into_iter()
            .map(|span| &text[span])
            .collect()
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Greedy sentence packer shared by the sentence-aware strategies.
struct Packer<'a> {
    max_tokens: usize,
    current: Vec<&'a str>,
    current_tokens: usize,
    chunks: Vec<String>,
}

impl<'a> Packer<'a> {
    fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            current: Vec::new(),
            current_tokens: 0,
            chunks: Vec::new(),
        }
    }

    fn would_overflow(&self, tokens: usize) -> bool {
        !self.current.is_empty() && self.current_tokens + tokens > self.max_tokens
    }

    fn push(&mut self, sentence: &'a str, tokens: usize) {
        if self.would_overflow(tokens) {
            self.flush();
        }
        self.current.push(sentence);
        self.current_tokens += tokens;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(self.current.join(" "));
            self.current.clear();
        }
        self.current_tokens = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}
