//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{Result, RetrievalError};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, a local model,
/// feature hashing, ...) behind a unified async interface. An embedding is a
/// pure function of its input text. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// # async fn demo() -> retrieval_core::Result<()> {
/// let provider = HashingEmbeddingProvider::new(64);
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short provider name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Check a batch response: one vector per input, each of the provider's
/// dimensionality, with finite components.
///
/// # Errors
///
/// Returns [`RetrievalError::Embedding`] describing the first problem found.
pub fn validate_embeddings(
    provider: &dyn EmbeddingProvider,
    expected: usize,
    embeddings: &[Vec<f32>],
) -> Result<()> {
    if embeddings.len() != expected {
        return Err(RetrievalError::embedding(
            provider.name(),
            format!("expected {expected} embeddings, got {}", embeddings.len()),
        ));
    }
    let dimensions = provider.dimensions();
    for (i, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dimensions {
            return Err(RetrievalError::embedding(
                provider.name(),
                format!(
                    "embedding {i} has dimension {}, expected {dimensions}",
                    embedding.len()
                ),
            ));
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(RetrievalError::embedding(
                provider.name(),
                format!("embedding {i} contains non-finite values"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn default_batch_preserves_order_and_count() {
        let provider = Fixed(vec![1.0, 0.0, 0.0]);
        let out = provider.embed_batch(&["a", "b", "c"]).await.unwrap();
        assert_eq!(out.len(), 3);
        assert!(validate_embeddings(&provider, 3, &out).is_ok());
    }

    #[test]
    fn rejects_malformed_batches() {
        let provider = Fixed(vec![]);
        let good = vec![vec![0.0, 1.0, 0.0]];
        assert!(validate_embeddings(&provider, 2, &good).is_err());
        assert!(validate_embeddings(&provider, 1, &[vec![0.0, 1.0]]).is_err());
        assert!(validate_embeddings(&provider, 1, &[vec![0.0, f32::NAN, 0.0]]).is_err());
    }
}
