use super::Tokenizer;
use crate::error::{ContextError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};
use tracing::debug;

/// Each piece is a word or a single punctuation mark together with the
/// whitespace in front of it. A trailing run of whitespace is its own piece,
/// so concatenating every piece reproduces the input exactly.
static PIECES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:\w+|[^\w\s])|\s+").expect("piece pattern is valid"));

/// Low bits of an id index the vocabulary, high bits carry its epoch.
const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Default number of distinct pieces kept before the vocabulary is reset.
pub const DEFAULT_MAX_PIECES: usize = 1 << 20;

#[derive(Debug, Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    pieces: Vec<String>,
    epoch: u8,
}

impl Vocab {
    fn reset(&mut self) {
        self.ids.clear();
        self.pieces.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Ids for `pieces`, or `None` once more than `max_pieces` would be stored.
    fn assign(&mut self, pieces: &[&str], max_pieces: usize) -> Result<Option<Vec<u32>>> {
        let epoch = u32::from(self.epoch) << INDEX_BITS;
        let mut tokens = Vec::with_capacity(pieces.len());
        for &piece in pieces {
            let id = match self.ids.get(piece) {
                Some(id) => *id,
                None if self.pieces.len() >= max_pieces => return Ok(None),
                None => {
                    let index = u32::try_from(self.pieces.len())
                        .map_err(|_| ContextError::nlp("tokenizer vocabulary overflow"))?;
                    let id = epoch | index;
                    self.pieces.push(piece.to_string());
                    self.ids.insert(piece.to_string(), id);
                    id
                }
            };
            tokens.push(id);
        }
        Ok(Some(tokens))
    }
}

/// Lossless word-level tokenizer with a vocabulary grown on demand.
///
/// Ids are only meaningful for the instance that produced them. The
/// vocabulary holds at most `max_pieces` entries; an `encode` that would
/// exceed it starts a fresh vocabulary, after which `decode` rejects ids
/// handed out before the reset.
#[derive(Debug)]
pub struct RegexTokenizer {
    vocab: RwLock<Vocab>,
    max_pieces: usize,
}

impl RegexTokenizer {
    pub fn new() -> Self {
        Self {
            vocab: RwLock::new(Vocab::default()),
            max_pieces: DEFAULT_MAX_PIECES,
        }
    }

    /// Cap the vocabulary. Clamped to `1..=2^24`.
    pub fn with_max_pieces(self, max_pieces: usize) -> Self {
        Self {
            max_pieces: max_pieces.clamp(1, 1 << INDEX_BITS),
            ..self
        }
    }
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for RegexTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let pieces: Vec<&str> = PIECES.find_iter(text).map(|m| m.as_str()).collect();
        let mut vocab = self
            .vocab
            .write()
            .map_err(|_| ContextError::nlp("tokenizer vocabulary lock poisoned"))?;

        if let Some(tokens) = vocab.assign(&pieces, self.max_pieces)? {
            return Ok(tokens);
        }
        debug!(
            "Tokenizer vocabulary reached {} pieces, starting over",
            self.max_pieces
        );
        vocab.reset();
        vocab.assign(&pieces, self.max_pieces)?.ok_or_else(|| {
            ContextError::nlp(format!(
                "text has more than {} distinct pieces",
                self.max_pieces
            ))
        })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let vocab = self
            .vocab
            .read()
            .map_err(|_| ContextError::nlp("tokenizer vocabulary lock poisoned"))?;

        let mut text = String::new();
        for &id in tokens {
            if id >> INDEX_BITS != u32::from(vocab.epoch) {
                return Err(ContextError::nlp(format!(
                    "token id {id} predates a vocabulary reset"
                )));
            }
            let piece = vocab
                .pieces
                .get((id & INDEX_MASK) as usize)
                .ok_or_else(|| ContextError::nlp(format!("unknown token id {id}")))?;
            text.push_str(piece);
        }
        Ok(text)
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(PIECES.find_iter(text).count())
    }
}

/// Tokenizer backed by a HuggingFace `tokenizer.json`, such as the gpt2 one.
#[cfg(feature = "hf-tokenizers")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizers")]
impl HfTokenizer {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| ContextError::nlp(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "hf-tokenizers")]
impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ContextError::nlp(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, true)
            .map_err(|e| ContextError::nlp(e.to_string()))
    }
}
