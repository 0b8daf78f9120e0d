//! Retriever (C8, §4.8): embed → oversampled vector search → optional
//! multi-query merge → rerank.
//!
//! Reranking only ever narrows an oversampled candidate set; it never
//! grows it and never substitutes for the vector search. A reranker
//! failure falls back to the pre-rerank order inside [`crate::reranker`],
//! so this layer never has to special-case it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sable_core::{LlmProvider, MetadataFilter};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::reranker::Reranker;
use crate::vectorstore::VectorStore;

/// Multi-query expansion fan-out: the original query plus this many
/// paraphrases.
const MULTI_QUERY_FANOUT: usize = 3;

/// Floor on the oversampled candidate count handed to the reranker, so a
/// small `k`/`top_n` still gives the cross-encoder a reasonable breadth to
/// choose from.
const MIN_RERANK_CANDIDATES: usize = 20;

/// Produces alternate phrasings of a query for multi-query retrieval
/// (§4.8, disabled by default). Each expansion is searched independently
/// and results are merged by chunk id, keeping the highest score seen.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str, n: usize) -> Result<Vec<String>>;
}

/// Returns only the original query; used when multi-query is disabled.
pub struct NoOpQueryExpander;

#[async_trait]
impl QueryExpander for NoOpQueryExpander {
    async fn expand(&self, query: &str, _n: usize) -> Result<Vec<String>> {
        Ok(vec![query.to_string()])
    }
}

/// Asks an [`LlmProvider`] for `n - 1` paraphrases of the query, one per
/// line, and returns them alongside the original.
pub struct LlmQueryExpander {
    llm: Arc<dyn LlmProvider>,
}

impl LlmQueryExpander {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryExpander for LlmQueryExpander {
    async fn expand(&self, query: &str, n: usize) -> Result<Vec<String>> {
        if n <= 1 {
            return Ok(vec![query.to_string()]);
        }
        let prompt = format!(
            "Rewrite the following search query {} different ways, one per line, no numbering:\n{}",
            n - 1,
            query
        );
        let response = self.llm.chat(&[sable_core::ChatMessage::user(prompt)], None).await?;
        let mut variants: Vec<String> = response
            .message
            .content
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .take(n - 1)
            .collect();
        variants.insert(0, query.to_string());
        Ok(variants)
    }
}

/// The embed-search-rerank pipeline behind one topic or corpus (§4.8).
pub struct Retriever {
    embeddings: Arc<EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    expander: Arc<dyn QueryExpander>,
    k: usize,
    reranker_enabled: bool,
    reranker_top_n: usize,
    multi_query: bool,
}

impl Retriever {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embeddings: Arc<EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        expander: Arc<dyn QueryExpander>,
        k: usize,
        reranker_enabled: bool,
        reranker_top_n: usize,
        multi_query: bool,
    ) -> Self {
        Self { embeddings, store, reranker, expander, k, reranker_enabled, reranker_top_n, multi_query }
    }

    /// Retrieve the top-k chunks for `query_text`, optionally scoped by
    /// `filter`.
    pub async fn retrieve(&self, query_text: &str, filter: Option<&MetadataFilter>) -> Result<Vec<SearchResult>> {
        let candidate_count = if self.reranker_enabled {
            (2 * self.k).max(MIN_RERANK_CANDIDATES)
        } else {
            self.k
        };

        let queries = if self.multi_query {
            self.expander.expand(query_text, MULTI_QUERY_FANOUT).await?
        } else {
            vec![query_text.to_string()]
        };

        let mut merged: HashMap<String, SearchResult> = HashMap::new();
        for q in &queries {
            let vector = self.embeddings.embed_query(q).await?;
            let results = self.store.search(&vector, candidate_count, filter).await?;
            for result in results {
                merged
                    .entry(result.chunk.id.clone())
                    .and_modify(|existing| {
                        if result.score > existing.score {
                            *existing = result.clone();
                        }
                    })
                    .or_insert(result);
            }
        }

        let mut candidates: Vec<SearchResult> = merged.into_values().collect();
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(candidate_count);

        if self.reranker_enabled {
            self.reranker.rerank(query_text, candidates, self.reranker_top_n).await
        } else {
            candidates.truncate(self.k);
            Ok(candidates)
        }
    }
}
