/// Batched embedding generation
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Vectors produced for one `embed_all` call
#[derive(Debug)]
pub struct BatchResult {
    pub embeddings: Vec<Vec<f32>>,
    pub batches: usize,
}

/// Splits large inputs into provider-sized batches
///
/// Batches are embedded sequentially; the first failing batch aborts the whole call
/// so that callers never see a partial result.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    /// Create a new batch embedder
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `batch_size` - Number of texts sent to the provider per call
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed every text, preserving input order
    pub fn embed_all(&self, texts: &[String]) -> Result<BatchResult, EmbeddingError> {
        let start = std::time::Instant::now();
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut batches = 0;

        for chunk in texts.chunks(self.batch_size) {
            let vectors = self.provider.embed_batch(chunk)?;

            if vectors.len() != chunk.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    chunk.len(),
                    vectors.len()
                )));
            }

            let dimension = self.provider.dimension();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: bad.len(),
                });
            }

            embeddings.extend(vectors);
            batches += 1;
            debug!("Embedded batch {} ({} texts)", batches, chunk.len());
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        if !texts.is_empty() {
            info!(
                "Embedded {} texts in {} batches, {}ms",
                texts.len(),
                batches,
                duration_ms
            );
        }

        Ok(BatchResult {
            embeddings,
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts provider calls and fails on a chosen call
    struct CountingProvider {
        inner: HashingEmbedProvider,
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on {
                return Err(EmbeddingError::GenerationError("boom".to_string()));
            }
            self.inner.embed_batch(texts)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn provider(fail_on: Option<usize>) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            inner: HashingEmbedProvider::new(16).unwrap(),
            calls: AtomicUsize::new(0),
            fail_on,
        })
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Test document number {}", i)).collect()
    }

    #[test]
    fn test_batches_split_by_size() {
        let counting = provider(None);
        let embedder = BatchEmbedder::new(counting.clone(), 32);

        let result = embedder.embed_all(&texts(100)).unwrap();
        assert_eq!(result.embeddings.len(), 100);
        assert_eq!(result.batches, 4);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_order_preserved() {
        let counting = provider(None);
        let embedder = BatchEmbedder::new(counting.clone(), 3);
        let input = texts(7);

        let result = embedder.embed_all(&input).unwrap();
        for (text, vector) in input.iter().zip(&result.embeddings) {
            assert_eq!(vector, &counting.inner.embed(text).unwrap());
        }
    }

    #[test]
    fn test_failure_aborts_everything() {
        let embedder = BatchEmbedder::new(provider(Some(1)), 2);
        assert!(embedder.embed_all(&texts(5)).is_err());
    }

    #[test]
    fn test_empty_input() {
        let counting = provider(None);
        let embedder = BatchEmbedder::new(counting.clone(), 8);

        let result = embedder.embed_all(&[]).unwrap();
        assert!(result.embeddings.is_empty());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }
}
