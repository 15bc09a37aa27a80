//! Feature-hashing embeddings that need no model files.

use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingResult, normalize_to_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Deterministic bag-of-words embeddings.
///
/// Every lowercased alphanumeric word is hashed with FNV into one of
/// `dimension` buckets with a hash-derived sign, and the vector is
/// L2-normalized. Texts sharing words get a high cosine similarity, which is
/// enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
}

impl HashEmbedProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(word.to_lowercase().as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_to_f16(&vector)
    }
}

impl Default for HashEmbedProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[tokio::test]
    async fn test_embeddings_are_deterministic_and_normalized() {
        let provider = HashEmbedProvider::new(64);
        let a = provider.embed_text("The sky is blue.").await.unwrap();
        let b = provider.embed_text("the SKY is blue").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-2);
    }

    #[tokio::test]
    async fn test_shared_words_rank_higher() {
        let provider = HashEmbedProvider::default();
        let texts = vec![
            "The sky is blue.".to_string(),
            "Water is wet.".to_string(),
            "Fire is hot.".to_string(),
        ];
        let docs = provider.embed_texts(&texts).await.unwrap();
        let query = provider.embed_text("What color is the sky?").await.unwrap();

        let sky = cosine(&query, &docs.embeddings[0]);
        assert!(sky > cosine(&query, &docs.embeddings[1]));
        assert!(sky > cosine(&query, &docs.embeddings[2]));
    }

    #[tokio::test]
    async fn test_empty_text_gives_zero_vector() {
        let provider = HashEmbedProvider::new(8);
        let embedding = provider.embed_text("").await.unwrap();
        assert_eq!(embedding.len(), 8);
        assert!(embedding.iter().all(|v| v.to_f32() == 0.0));
        assert!(provider.embed_texts(&[]).await.unwrap().is_empty());
    }
}
