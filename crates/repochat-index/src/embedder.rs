//! Sub-batched embedding with bounded concurrency and order preservation.

use std::ops::Range;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use repochat_llm::{LlmError, LlmProvider};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Maximum texts per provider call.
    pub batch_size: usize,
    /// Maximum total characters per provider call. A single longer text is
    /// still sent, alone.
    pub max_batch_chars: usize,
    /// Concurrent provider calls.
    pub concurrency: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_batch_chars: 100_000,
            concurrency: 4,
        }
    }
}

pub struct BatchEmbedder<P: LlmProvider> {
    provider: Arc<P>,
    config: EmbedderConfig,
}

impl<P: LlmProvider> BatchEmbedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: EmbedderConfig) -> Self {
        Self { provider, config }
    }

    /// Embed `texts`, returning one vector per text in input order.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Embedding` if a sub-batch still fails after being
    /// retried in halves, or `IndexError::EmbeddingShape` if the provider
    /// returns a wrong count or inconsistent dimensions.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let ranges = plan_batches(texts, &self.config);
        tracing::info!(
            texts = texts.len(),
            batches = ranges.len(),
            "embedding chunks"
        );

        let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(ranges)
            .map(|range| self.embed_range(texts, range))
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        check_shape(texts.len(), &vectors)?;
        Ok(vectors)
    }

    async fn embed_range(&self, texts: &[String], range: Range<usize>) -> Result<Vec<Vec<f32>>> {
        let batch = &texts[range.clone()];
        match self.call(batch).await {
            Ok(vectors) => {
                tracing::debug!(start = range.start, len = batch.len(), "embedded batch");
                Ok(vectors)
            }
            Err(e) => {
                tracing::warn!(
                    start = range.start,
                    len = batch.len(),
                    error = %e,
                    "embedding batch failed, retrying in halves"
                );
                let mid = batch.len().div_ceil(2);
                let (left, right) = batch.split_at(mid);
                let mut vectors = self.call(left).await?;
                if !right.is_empty() {
                    vectors.extend(self.call(right).await?);
                }
                Ok(vectors)
            }
        }
    }

    async fn call(&self, batch: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let vectors = self.provider.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(LlmError::EmbeddingCount {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

/// Contiguous ranges respecting both the item and the character limit.
#[must_use]
pub fn plan_batches(texts: &[String], config: &EmbedderConfig) -> Vec<Range<usize>> {
    let max_items = config.batch_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let count = i - start;
        if count > 0 && (count >= max_items || chars + len > config.max_batch_chars) {
            ranges.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < texts.len() {
        ranges.push(start..texts.len());
    }
    ranges
}

fn check_shape(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(IndexError::EmbeddingShape(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        let dim = first.len();
        if dim == 0 {
            return Err(IndexError::EmbeddingShape("empty embedding vector".into()));
        }
        if let Some(pos) = vectors.iter().position(|v| v.len() != dim) {
            return Err(IndexError::EmbeddingShape(format!(
                "vector {pos} has dimension {}, expected {dim}",
                vectors[pos].len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repochat_llm::mock::MockProvider;

    fn texts(lens: &[usize]) -> Vec<String> {
        lens.iter().map(|n| "a".repeat(*n)).collect()
    }

    fn config(batch_size: usize, max_batch_chars: usize) -> EmbedderConfig {
        EmbedderConfig {
            batch_size,
            max_batch_chars,
            concurrency: 3,
        }
    }

    #[test]
    fn plan_splits_by_item_count() {
        let ranges = plan_batches(&texts(&[1; 7]), &config(3, 1000));
        assert_eq!(ranges, vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn plan_splits_by_characters() {
        let ranges = plan_batches(&texts(&[4, 4, 4, 10, 1]), &config(10, 8));
        assert_eq!(ranges, vec![0..2, 2..3, 3..4, 4..5]);
    }

    #[test]
    fn plan_empty_input() {
        assert!(plan_batches(&[], &EmbedderConfig::default()).is_empty());
    }

    #[test]
    fn shape_rejects_mixed_dimensions() {
        let err = check_shape(2, &[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingShape(_)));
    }

    #[tokio::test]
    async fn order_is_preserved_across_sub_batches() {
        let provider = Arc::new(MockProvider::default().with_hashed_embeddings(32));
        let embedder = BatchEmbedder::new(Arc::clone(&provider), config(2, 1000));
        let inputs: Vec<String> = (0..9).map(|i| format!("text number {i}")).collect();

        let vectors = embedder.embed_all(&inputs).await.unwrap();

        assert_eq!(vectors.len(), inputs.len());
        for (text, vector) in inputs.iter().zip(&vectors) {
            assert_eq!(vector, &repochat_llm::mock::hashed_embedding(text, 32));
        }
        assert_eq!(provider.embed_batch_sizes().iter().sum::<usize>(), 9);
        assert!(provider.embed_batch_sizes().iter().all(|n| *n <= 2));
    }

    #[tokio::test]
    async fn order_survives_out_of_order_completion() {
        let provider = Arc::new(
            MockProvider::default()
                .with_hashed_embeddings(32)
                .with_embed_delays(vec![60, 40, 20, 0, 0]),
        );
        let embedder = BatchEmbedder::new(Arc::clone(&provider), config(2, 1000));
        let inputs: Vec<String> = (0..9).map(|i| format!("chunk {i} body")).collect();

        let vectors = embedder.embed_all(&inputs).await.unwrap();

        let completed = provider.embed_completion_order();
        assert_eq!(completed.len(), 5);
        assert_ne!(completed, vec![0, 1, 2, 3, 4]);
        for (text, vector) in inputs.iter().zip(&vectors) {
            assert_eq!(vector, &repochat_llm::mock::hashed_embedding(text, 32));
        }
    }

    #[tokio::test]
    async fn failure_aborts_after_split_retry() {
        let mut provider = MockProvider::default().with_fixed_embedding(vec![1.0]);
        provider.fail_embed = true;
        let provider = Arc::new(provider);
        let embedder = BatchEmbedder::new(Arc::clone(&provider), config(4, 1000));

        let err = embedder.embed_all(&texts(&[1, 1, 1, 1])).await.unwrap_err();

        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(provider.embed_batch_sizes(), vec![4, 2]);
    }
}
