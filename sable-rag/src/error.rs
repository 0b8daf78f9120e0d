//! Error types for the `sable-rag` crate.

use thiserror::Error;

/// Errors that can occur across ingestion, retrieval, and reranking.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// An error occurred in the vector store backend.
    #[error("vector store error ({backend}): {message}")]
    VectorStore { backend: String, message: String },

    /// An error occurred during document chunking.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// An error occurred during result reranking. Never surfaced to the
    /// caller as a failed retrieval: the retriever catches this and falls
    /// back to pre-rerank order (§4.7, §7 `RerankerFallback`).
    #[error("reranker error ({reranker}): {message}")]
    Reranker { reranker: String, message: String },

    /// A document loader failed to extract text (unsupported format, parse
    /// failure, or an encoding that could not be detected).
    #[error("loader error ({format}): {message}")]
    Loader { format: String, message: String },

    /// Chunk decryption failed: the store is considered tampered, and the
    /// affected read is aborted (§7 `CorruptionError`).
    #[error("corruption error: {0}")]
    Corruption(String),

    /// A configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An error in ingestion orchestration (loader → chunk → embed → store).
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// An error in retrieval orchestration (embed → search → rerank).
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// An error propagated from `sable-core`.
    #[error(transparent)]
    Core(#[from] sable_core::SableError),

    /// A storage-layer (sqlx) failure.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
