//! Deterministic feature-hashing embedding provider.
//!
//! [`HashingEmbeddingProvider`] needs no model and no network: each token is
//! hashed into one of `dimensions` buckets and the count vector is
//! L2-normalized. Texts sharing vocabulary get a positive cosine similarity,
//! which is enough for development, tests, and small keyword-heavy corpora.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "to", "was", "were", "with",
];

/// An [`EmbeddingProvider`] that hashes lowercase word tokens into buckets.
///
/// Stop words are dropped. A text with no remaining tokens embeds to the
/// zero vector, which has similarity 0 with everything.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// # async fn demo() -> retrieval_core::Result<()> {
/// let provider = HashingEmbeddingProvider::default();
/// let a = provider.embed("The cat sat").await?;
/// let b = provider.embed("cat").await?;
/// let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
/// assert!(dot > 0.5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Default number of hash buckets.
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Create a provider with the given number of buckets (at least one).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = token
            .bytes()
            .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME));
        (hash % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()));
        for token in tokens {
            vector[self.bucket(&token)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
