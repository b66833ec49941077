//! Embedding providers.
//!
//! The embedding model is an external collaborator. [`EmbeddingProvider`] is
//! the seam; [`LexicalEmbedder`] is a deterministic offline implementation
//! based on feature hashing, good enough for deduplication and tests but not
//! a semantic model.

use crate::core::{Error, Result};
use async_trait::async_trait;
use xxhash_rust::xxh64::xxh64;

/// Default dimension of [`LexicalEmbedder`] vectors.
pub const DEFAULT_LEXICAL_DIMENSIONS: usize = 256;

/// Source of fixed-dimension embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`. The vector must have [`dimensions`](Self::dimensions) components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier recorded in envelopes.
    fn model_name(&self) -> &str;

    /// Vector length produced by [`embed`](Self::embed).
    fn dimensions(&self) -> usize;
}

/// Feature-hashing bag-of-words embedder.
///
/// Each lower-cased word is hashed into one signed bucket; the result is
/// L2-normalized. Texts without words embed to the zero vector.
#[derive(Clone, Debug)]
pub struct LexicalEmbedder {
    dimensions: usize,
    model: String,
}

impl LexicalEmbedder {
    /// Embedder with [`DEFAULT_LEXICAL_DIMENSIONS`].
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_LEXICAL_DIMENSIONS)
    }

    /// Embedder producing `dimensions`-component vectors (at least one).
    pub fn with_dimensions(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("lexical-hash-{}", dimensions),
        }
    }

    /// Synchronous embedding.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let h = xxh64(word.as_bytes(), 0);
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LexicalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Check a provider's output against its declared dimension.
pub(crate) fn check_dimensions(provider: &dyn EmbeddingProvider, vector: &[f32]) -> Result<()> {
    if vector.len() != provider.dimensions() {
        return Err(Error::DimensionMismatch {
            expected: provider.dimensions(),
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = LexicalEmbedder::new();
        let a = embedder.embed_text("Build a JWT authentication system");
        let b = embedder.embed_text("build a jwt AUTHENTICATION system!");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_LEXICAL_DIMENSIONS);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = LexicalEmbedder::with_dimensions(8);
        assert!(embedder.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_dimension_floor_and_model_name() {
        let embedder = LexicalEmbedder::with_dimensions(0);
        assert_eq!(embedder.dimensions(), 1);
        assert_eq!(embedder.model_name(), "lexical-hash-1");
    }

    #[tokio::test]
    async fn test_provider_trait() {
        let provider: Box<dyn EmbeddingProvider> = Box::new(LexicalEmbedder::with_dimensions(32));
        let vector = provider.embed("rate limited api").await.unwrap();
        assert!(check_dimensions(provider.as_ref(), &vector).is_ok());
        assert!(matches!(
            check_dimensions(provider.as_ref(), &vector[..4]),
            Err(Error::DimensionMismatch {
                expected: 32,
                actual: 4
            })
        ));
    }
}
