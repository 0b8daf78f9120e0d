//! Reranker (C7, §4.7): a second relevance pass over a retriever's
//! oversampled candidate set.
//!
//! Reranking is advisory. A reranker failure — a model that fails to load,
//! a scoring call that errors — is never surfaced as a failed retrieval:
//! the retriever catches [`RagError::Reranker`] and falls back to
//! pre-rerank order (§7 `RerankerFallback`).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::document::SearchResult;
use crate::error::Result;

/// Re-scores and re-orders a candidate set. `top_n` is a hint, not a
/// contract: implementations may return fewer results than requested but
/// must never return more than they were given.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_id(&self) -> &str;

    async fn rerank(&self, query: &str, candidates: Vec<SearchResult>, top_n: usize) -> Result<Vec<SearchResult>>;
}

/// A reranker that returns its input unchanged, truncated to `top_n`. Used
/// when reranking is disabled (§6 `reranker.enabled = false`).
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    fn model_id(&self) -> &str {
        "noop"
    }

    async fn rerank(&self, _query: &str, mut candidates: Vec<SearchResult>, top_n: usize) -> Result<Vec<SearchResult>> {
        candidates.truncate(top_n);
        Ok(candidates)
    }
}

/// A cross-encoder-style backend that scores one `(query, candidate_text)`
/// pair at a time. Loading the underlying model is assumed to be
/// expensive, so [`CrossEncoderReranker`] only calls it once, lazily.
#[async_trait]
pub trait CrossEncoderBackend: Send + Sync {
    fn model_id(&self) -> &str;

    /// Load the model. Called at most once per [`CrossEncoderReranker`].
    async fn load(&self) -> Result<()>;

    /// Score `(query, candidate)` pairs in one call. Output order and
    /// length must match `candidates`.
    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>>;
}

/// A [`Reranker`] backed by a [`CrossEncoderBackend`], with lazy, memoized
/// model loading behind a double-checked async init so concurrent first
/// calls don't load the model twice.
pub struct CrossEncoderReranker {
    backend: Arc<dyn CrossEncoderBackend>,
    loaded: OnceCell<()>,
}

impl CrossEncoderReranker {
    pub fn new(backend: Arc<dyn CrossEncoderBackend>) -> Self {
        Self { backend, loaded: OnceCell::new() }
    }

    async fn ensure_loaded(&self) -> Result<()> {
        self.loaded.get_or_try_init(|| async { self.backend.load().await }).await?;
        Ok(())
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    async fn rerank(&self, query: &str, mut candidates: Vec<SearchResult>, top_n: usize) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        if let Err(e) = self.ensure_loaded().await {
            warn!(model = %self.backend.model_id(), error = %e, "reranker model failed to load, falling back to pre-rerank order");
            candidates.truncate(top_n);
            return Ok(candidates);
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        match self.backend.score(query, &texts).await {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.score = score;
                }
                candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                candidates.truncate(top_n);
                Ok(candidates)
            }
            Ok(_) => {
                warn!(model = %self.backend.model_id(), "reranker returned mismatched score count, falling back to pre-rerank order");
                candidates.truncate(top_n);
                Ok(candidates)
            }
            Err(e) => {
                warn!(model = %self.backend.model_id(), error = %e, "reranker scoring call failed, falling back to pre-rerank order");
                candidates.truncate(top_n);
                Ok(candidates)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                ordinal: 0,
                text: format!("text-{id}"),
                embedding: vec![],
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn noop_reranker_truncates_to_top_n() {
        let reranker = NoOpReranker;
        let results = reranker
            .rerank("q", vec![result("a", 0.1), result("b", 0.2), result("c", 0.3)], 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    struct FailingBackend;

    #[async_trait]
    impl CrossEncoderBackend for FailingBackend {
        fn model_id(&self) -> &str {
            "failing"
        }
        async fn load(&self) -> Result<()> {
            Err(crate::error::RagError::Reranker { reranker: "failing".to_string(), message: "no weights".to_string() })
        }
        async fn score(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![0.0; candidates.len()])
        }
    }

    #[tokio::test]
    async fn load_failure_falls_back_to_pre_rerank_order() {
        let reranker = CrossEncoderReranker::new(Arc::new(FailingBackend));
        let input = vec![result("a", 0.9), result("b", 0.1)];
        let results = reranker.rerank("q", input, 2).await.unwrap();
        assert_eq!(results[0].chunk.id, "a");
    }

    struct ReversingBackend {
        load_calls: AtomicUsize,
    }

    #[async_trait]
    impl CrossEncoderBackend for ReversingBackend {
        fn model_id(&self) -> &str {
            "reversing"
        }
        async fn load(&self) -> Result<()> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn score(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
            Ok((0..candidates.len()).rev().map(|i| i as f32).collect())
        }
    }

    #[tokio::test]
    async fn model_loads_once_across_calls() {
        let backend = Arc::new(ReversingBackend { load_calls: AtomicUsize::new(0) });
        let reranker = CrossEncoderReranker::new(backend.clone());

        reranker.rerank("q", vec![result("a", 0.0), result("b", 0.0)], 2).await.unwrap();
        reranker.rerank("q", vec![result("a", 0.0), result("b", 0.0)], 2).await.unwrap();

        assert_eq!(backend.load_calls.load(Ordering::SeqCst), 1);
    }
}
