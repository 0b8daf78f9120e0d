//! Embedding provider (C1): text → fixed-dimension vector, batched and
//! cached.
//!
//! [`EmbeddingBackend`] is the pluggable model call; [`EmbeddingProvider`]
//! wraps a backend with batching plus a cache so every backend gets both
//! for free unless it has reason to override for throughput.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::EmbeddingCache;
use crate::error::{RagError, Result};

/// A model call that produces embeddings for a batch of texts in one
/// round-trip. Implementations wrap a specific backend (a local model, a
/// remote embedding API); retry policy for transient failures is the
/// caller's concern, not the backend's (§4.1 failure semantics: this layer
/// does not retry).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier used as the embedding-cache key prefix and the vector
    /// store's per-model table name.
    fn model_id(&self) -> &str;

    /// Fixed dimensionality of vectors this backend produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of non-empty texts in one call.
    async fn embed_batch_uncached(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Maps text to fixed-dimension vectors, batched and cache-backed (§4.1).
pub struct EmbeddingProvider {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Arc<EmbeddingCache>,
    batch_size: usize,
}

impl EmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, cache: Arc<EmbeddingCache>, batch_size: usize) -> Self {
        Self { backend, cache, batch_size: batch_size.max(1) }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_documents(&[text]).await?;
        results.pop().ok_or_else(|| RagError::Embedding {
            provider: self.backend.model_id().to_string(),
            message: "embedding backend returned no vector for a single input".to_string(),
        })
    }

    /// Embed a finite sequence of non-empty strings, same-length output
    /// ordered to match input (§4.1, B1: empty input yields empty output).
    pub async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_id = self.backend.model_id().to_string();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        for batch_start in (0..texts.len()).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(texts.len());
            let batch = &texts[batch_start..batch_end];

            let mut miss_indices = Vec::new();
            let mut miss_texts = Vec::new();

            for (offset, text) in batch.iter().enumerate() {
                let index = batch_start + offset;
                if let Some(cached) = self.cache.get(&model_id, text).await {
                    results[index] = Some(cached);
                } else {
                    miss_indices.push(index);
                    miss_texts.push(*text);
                }
            }

            if !miss_texts.is_empty() {
                debug!(
                    model = %model_id,
                    batch_size = miss_texts.len(),
                    "embedding cache miss, calling backend"
                );
                let embedded = self.backend.embed_batch_uncached(&miss_texts).await.map_err(|e| {
                    warn!(model = %model_id, error = %e, "embedding backend call failed");
                    e
                })?;

                if embedded.len() != miss_texts.len() {
                    return Err(RagError::Embedding {
                        provider: model_id.clone(),
                        message: format!(
                            "backend returned {} vectors for {} inputs",
                            embedded.len(),
                            miss_texts.len()
                        ),
                    });
                }

                for (index, (text, vector)) in miss_indices.iter().zip(miss_texts.iter().zip(embedded)) {
                    self.cache.put(&model_id, text, vector.clone()).await;
                    results[*index] = Some(vector);
                }
            }
        }

        Ok(results.into_iter().map(|v| v.expect("every index filled by hit or miss path")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        fn model_id(&self) -> &str {
            "test-model"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_batch_uncached(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn empty_input_returns_empty_output() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let provider = EmbeddingProvider::new(backend, Arc::new(EmbeddingCache::new(10)), 32);
        let result = provider.embed_documents(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_avoids_backend_call() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let provider = EmbeddingProvider::new(backend.clone(), Arc::new(EmbeddingCache::new(10)), 32);

        let first = provider.embed_query("hello").await.unwrap();
        let second = provider.embed_query("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preserves_input_order_across_batches() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let provider = EmbeddingProvider::new(backend, Arc::new(EmbeddingCache::new(10)), 2);

        let texts = vec!["a", "bb", "ccc", "dddd", "e"];
        let refs: Vec<&str> = texts.clone();
        let result = provider.embed_documents(&refs).await.unwrap();

        let lens: Vec<f32> = result.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 1.0]);
    }
}
