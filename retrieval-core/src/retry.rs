//! Resilient batch embedding.
//!
//! [`embed_with_retry`] wraps an [`EmbeddingProvider`] batch call with
//! exponential backoff. A batch that keeps failing is split in half and each
//! half is retried on its own, so one bad input cannot sink the texts around
//! it. A single text that fails after its retries ends the call with that
//! error; nothing is dropped silently.

use std::collections::VecDeque;
use std::ops::Range;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, warn};

use crate::config::EmbeddingRetryPolicy;
use crate::embedding::{EmbeddingProvider, validate_embeddings};
use crate::error::{Result, RetrievalError};

/// Embed `texts` in input order, retrying and splitting failed batches.
///
/// # Errors
///
/// Returns the last [`RetrievalError::Embedding`] for a single text that
/// could not be embedded after all retries. Non-retryable errors are
/// returned immediately.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    policy: &EmbeddingRetryPolicy,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    let mut pending: VecDeque<Range<usize>> = VecDeque::from([0..texts.len()]);

    while let Some(range) = pending.pop_front() {
        let batch = &texts[range.clone()];
        match embed_batch_with_backoff(provider, batch, policy).await {
            Ok(vectors) => {
                for (slot, vector) in embeddings[range].iter_mut().zip(vectors) {
                    *slot = Some(vector);
                }
            }
            Err(e) if e.is_retryable() && range.len() > 1 => {
                let mid = range.start + range.len() / 2;
                warn!(
                    provider = provider.name(),
                    batch_size = range.len(),
                    error = %e,
                    "embedding batch failed, splitting"
                );
                pending.push_front(mid..range.end);
                pending.push_front(range.start..mid);
            }
            Err(e) => return Err(e),
        }
    }

    embeddings
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| RetrievalError::embedding(provider.name(), "missing embedding"))
        })
        .collect()
}

async fn embed_batch_with_backoff(
    provider: &dyn EmbeddingProvider,
    batch: &[&str],
    policy: &EmbeddingRetryPolicy,
) -> Result<Vec<Vec<f32>>> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.min_delay())
        .with_max_delay(policy.max_delay())
        .with_max_times(policy.max_retries);

    let attempt = || async move {
        let vectors = provider.embed_batch(batch).await?;
        validate_embeddings(provider, batch.len(), &vectors)?;
        Ok::<_, RetrievalError>(vectors)
    };

    attempt
        .retry(backoff)
        .when(RetrievalError::is_retryable)
        .notify(|e, delay| {
            debug!(
                provider = provider.name(),
                batch_size = batch.len(),
                error = %e,
                ?delay,
                "retrying embedding batch"
            );
        })
        .await
}
