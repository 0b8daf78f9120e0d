//! The recognized configuration keys (§6), aggregated into one typed,
//! validating config struct, following the `RagConfig` /
//! `RagConfigBuilder` builder-with-validation pattern.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::ExecutionStrategy;
use crate::error::{Result, SableError};

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub batch_size: usize,
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model_id: "default-embedding".to_string(), batch_size: 32, cache_capacity: 10_000 }
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    pub window_size: usize,
    pub overlap_ratio: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { window_size: 512, overlap_ratio: 0.2 }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    pub k: usize,
    pub multi_query: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 5, multi_query: false }
    }
}

/// Reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model_id: String,
    pub top_n: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self { enabled: false, model_id: "default-cross-encoder".to_string(), top_n: 5 }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    pub strategy: ExecutionStrategy,
    pub max_parallel: usize,
    pub per_agent_timeout_s: u64,
    pub agents_enabled: Vec<String>,
    pub conditional_confidence_threshold: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::Hybrid,
            max_parallel: 5,
            per_agent_timeout_s: 30,
            agents_enabled: vec!["rag".to_string()],
            conditional_confidence_threshold: 0.7,
        }
    }
}

/// Token tracker configuration. `price_table` overrides or extends
/// `sable-tokens`'s static default table, keyed by model id to
/// `(input_price_per_1k, output_price_per_1k)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TokensConfig {
    pub price_table: HashMap<String, (f64, f64)>,
}

/// The full set of recognized configuration keys (§6), composed into one
/// struct with a validating builder (teacher precedent:
/// `RagConfig::builder()` / `RagConfigBuilder::build()`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub reranker: RerankerConfig,
    pub orchestrator: OrchestratorConfig,
    pub tokens: TokensConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            reranker: RerankerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tokens: TokensConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validate cross-field invariants beyond what each sub-config's own
    /// construction already guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.overlap_ratio < 0.0 || self.chunking.overlap_ratio >= 1.0 {
            return Err(SableError::Configuration(format!(
                "chunking.overlap_ratio must be in [0, 1), got {}",
                self.chunking.overlap_ratio
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(SableError::Configuration("embedding.batch_size must be > 0".to_string()));
        }
        if self.reranker.top_n == 0 {
            return Err(SableError::Configuration("reranker.top_n must be > 0".to_string()));
        }
        if self.orchestrator.max_parallel == 0 {
            return Err(SableError::Configuration(
                "orchestrator.max_parallel must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl CoreConfigBuilder {
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    pub fn chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.config.chunking = chunking;
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    pub fn reranker(mut self, reranker: RerankerConfig) -> Self {
        self.config.reranker = reranker;
        self
    }

    pub fn orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.config.orchestrator = orchestrator;
        self
    }

    pub fn tokens(mut self, tokens: TokensConfig) -> Self {
        self.config.tokens = tokens;
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
