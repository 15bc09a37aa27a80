//! NLP collaborators used by the chunking strategies.
//!
//! Chunking only needs five capabilities from a language toolkit: token
//! encode/decode, sentence spans, entity spans and a per-sentence topic
//! assignment. Each is a trait so a heavier backend can be swapped in without
//! touching [`crate::chunker`].
//!
//! The default implementations are rule based and deterministic:
//!
//! - [`RegexTokenizer`]: word/punctuation pieces that own their leading whitespace
//! - [`RuleSentenceSplitter`]: terminal punctuation and blank lines
//! - [`CapitalizationEntityRecognizer`]: capitalized spans that are not sentence-initial
//! - [`KMeansTopicModel`]: seeded k-means over bag-of-words sentence vectors
//!
//! With the `hf-tokenizers` feature, `HfTokenizer` loads a HuggingFace
//! `tokenizer.json` instead.

mod entities;
mod sentences;
mod tokenizer;
mod topics;

use crate::error::Result;
use std::ops::Range;

pub use entities::CapitalizationEntityRecognizer;
pub use sentences::RuleSentenceSplitter;
#[cfg(feature = "hf-tokenizers")]
pub use tokenizer::HfTokenizer;
pub use tokenizer::RegexTokenizer;
pub use topics::KMeansTopicModel;

/// Converts text to token ids and back.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token ids back into text.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Number of tokens `text` encodes to.
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Finds sentence boundaries as byte ranges into the input.
///
/// Returned ranges are ordered, non-overlapping and trimmed of surrounding whitespace.
pub trait SentenceSplitter: Send + Sync {
    fn sentences(&self, text: &str) -> Vec<Range<usize>>;
}

/// Finds named-entity mentions as byte ranges into the input.
pub trait EntityRecognizer: Send + Sync {
    fn entities(&self, text: &str) -> Vec<Range<usize>>;
}

/// Assigns a latent topic id in `0..num_topics` to every sentence.
pub trait TopicModel: Send + Sync {
    fn assign(&self, sentences: &[&str], num_topics: usize) -> Vec<usize>;
}
