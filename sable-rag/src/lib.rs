//! Document ingestion, embedding, vector storage, and retrieve-then-rerank
//! pipeline.
//!
//! Modules are layered bottom-up: [`embedding`] and [`crypto`] have no
//! dependents inside this crate besides [`vectorstore`]; [`chunker`] and
//! [`loader`] feed [`ingestion`]; [`retriever`] composes [`embedding`],
//! [`vectorstore`], and [`reranker`]; [`tool`] exposes [`retriever`] to the
//! agent layer.

pub mod cache;
pub mod chunker;
pub mod crypto;
pub mod document;
pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod progress;
pub mod reranker;
pub mod repository;
pub mod retriever;
pub mod tool;
pub mod vectorstore;

pub use cache::EmbeddingCache;
pub use chunker::{Chunker, CodeChunker, RecursiveChunker};
pub use crypto::ChunkEncryptor;
pub use document::{Chunk, Document, DocumentFormat, LoadedRecord, SearchResult, Topic};
pub use embedding::{EmbeddingBackend, EmbeddingProvider};
pub use error::{RagError, Result};
pub use ingestion::{IngestionPipeline, IngestionSummary};
pub use loader::{DocumentLoader, LoaderRegistry};
pub use progress::ProgressEvent;
pub use reranker::{CrossEncoderBackend, CrossEncoderReranker, NoOpReranker, Reranker};
pub use repository::DocumentRepository;
pub use retriever::{LlmQueryExpander, NoOpQueryExpander, QueryExpander, Retriever};
pub use tool::RagTool;
pub use vectorstore::{CompactionSummary, InMemoryVectorStore, SqliteVectorStore, VectorStore};
