//! Ingestion pipeline (C2, §4.6): load → chunk → embed → store for one
//! document at a time, with cancellation polled between every stage.
//!
//! Each document's chunks land in the store in a single [`VectorStore::upsert`]
//! call after every prior stage succeeds, so a failure mid-load or
//! mid-embed never leaves partial chunks behind: there is nothing to roll
//! back because nothing was written yet. Re-ingesting an existing document
//! first tombstones its previous chunks so a retried ingest cannot double
//! up stale and fresh versions of the same document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sable_core::CancellationToken;
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::document::Document;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::loader::LoaderRegistry;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::repository::DocumentRepository;
use crate::vectorstore::VectorStore;

/// Outcome of a [`IngestionPipeline::process_files`] batch: which documents
/// landed, which failed and why, and how many chunks were written in all.
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub total_chunks: usize,
}

/// Coordinates the loader, chunker, embedding provider, and vector store
/// behind one embedding model.
pub struct IngestionPipeline {
    loaders: Arc<LoaderRegistry>,
    chunker: Arc<dyn Chunker>,
    embeddings: Arc<EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    pub fn new(
        loaders: Arc<LoaderRegistry>,
        chunker: Arc<dyn Chunker>,
        embeddings: Arc<EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self { loaders, chunker, embeddings, store }
    }

    /// Ingest one file into `document`'s id, reporting progress through
    /// `on_progress`, returning the number of chunks written. A
    /// cancellation observed between stages stops the pipeline without
    /// storing anything and emits `Cancelled`, not `Failed` — cancellation
    /// is not an error (§4.6 cancellation semantics). This does not touch
    /// document/topic bookkeeping; callers that need the document row
    /// registered should use [`Self::process_files`] instead.
    pub async fn ingest_file(
        &self,
        document: &Document,
        path: &Path,
        cancellation: &CancellationToken,
        on_progress: &dyn ProgressSink,
    ) -> Result<usize> {
        let document_id = document.id.clone();
        on_progress.send(ProgressEvent::Started { document_id: document_id.clone(), total_bytes: document.byte_size });

        let result = self.run(document, path, cancellation, on_progress).await;
        match &result {
            Ok(_) => on_progress.send(ProgressEvent::Completed { document_id }),
            Err(RagError::Ingestion(message)) if message == "cancelled" => {
                on_progress.send(ProgressEvent::Cancelled { document_id });
                return Err(RagError::Ingestion("cancelled".to_string()));
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "ingestion failed");
                on_progress.send(ProgressEvent::Failed { document_id, message: e.to_string() });
            }
        }
        result
    }

    /// Ingest `files` into `topic_id` one at a time (§4.6 contract
    /// `process_files(files, topic_id, callbacks) → summary`; "sequential,
    /// not parallel" — the only parallelism is the batched embedding call
    /// inside a single file).
    ///
    /// Each successfully ingested file's document row is registered
    /// against `repository` as part of this call. A per-file ingestion
    /// error leaves previously ingested files in the batch untouched and
    /// moves on to the next file (§7 "previously ingested files in the
    /// same batch remain"). A cancellation instead rolls back every
    /// document already committed earlier in this batch, by id (§4.6
    /// cancellation semantics) — the two failure modes are handled
    /// differently on purpose.
    pub async fn process_files(
        &self,
        files: &[(Document, PathBuf)],
        repository: &DocumentRepository,
        cancellation: &CancellationToken,
        on_progress: &dyn ProgressSink,
    ) -> Result<IngestionSummary> {
        let mut summary = IngestionSummary::default();

        for (document, path) in files {
            if cancellation.is_cancelled() {
                self.rollback_batch(&summary.succeeded, repository).await;
                return Err(RagError::Ingestion("cancelled".to_string()));
            }

            match self.ingest_file(document, path, cancellation, on_progress).await {
                Ok(chunk_count) => {
                    if cancellation.is_cancelled() {
                        self.rollback_batch(&summary.succeeded, repository).await;
                        return Err(RagError::Ingestion("cancelled".to_string()));
                    }
                    match repository.register_document(document.clone()).await {
                        Ok(()) => {
                            summary.succeeded.push(document.id.clone());
                            summary.total_chunks += chunk_count;
                        }
                        Err(e) => summary.failed.push((document.id.clone(), e.to_string())),
                    }
                }
                Err(RagError::Ingestion(message)) if message == "cancelled" => {
                    self.rollback_batch(&summary.succeeded, repository).await;
                    return Err(RagError::Ingestion("cancelled".to_string()));
                }
                Err(e) => summary.failed.push((document.id.clone(), e.to_string())),
            }
        }

        Ok(summary)
    }

    /// Remove every document (and its cascade-deleted chunks) already
    /// committed earlier in a batch that was then cancelled.
    async fn rollback_batch(&self, document_ids: &[String], repository: &DocumentRepository) {
        for document_id in document_ids {
            if let Err(e) = repository.delete_document(document_id).await {
                warn!(document_id = %document_id, error = %e, "batch cancelled: failed to roll back a committed document");
            }
        }
    }

    async fn run(
        &self,
        document: &Document,
        path: &Path,
        cancellation: &CancellationToken,
        on_progress: &dyn ProgressSink,
    ) -> Result<usize> {
        if cancellation.is_cancelled() {
            return Err(RagError::Ingestion("cancelled".to_string()));
        }

        let records = self.loaders.load_path(path)?;
        on_progress.send(ProgressEvent::Loaded { document_id: document.id.clone(), record_count: records.len() });

        if cancellation.is_cancelled() {
            return Err(RagError::Ingestion("cancelled".to_string()));
        }

        let full_text = records.iter().map(|r| r.page_content.as_str()).collect::<Vec<_>>().join("\n\n");
        let mut base_metadata: HashMap<String, String> = HashMap::new();
        base_metadata.insert("topic_id".to_string(), document.topic_id.clone());
        base_metadata.insert("source_path".to_string(), document.source_path.clone());
        if !document.tags.is_empty() {
            base_metadata.insert("tags".to_string(), document.tags.join(","));
        }

        let mut chunks = self.chunker.chunk(&document.id, &full_text, &base_metadata);
        on_progress.send(ProgressEvent::Chunked { document_id: document.id.clone(), chunk_count: chunks.len() });

        if chunks.is_empty() {
            info!(document_id = %document.id, "document produced no chunks");
            on_progress.send(ProgressEvent::Embedded { document_id: document.id.clone(), chunk_count: 0 });
            self.store.delete_document(&document.id).await?;
            on_progress.send(ProgressEvent::Stored { document_id: document.id.clone() });
            return Ok(0);
        }

        if cancellation.is_cancelled() {
            return Err(RagError::Ingestion("cancelled".to_string()));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
        on_progress.send(ProgressEvent::Embedded { document_id: document.id.clone(), chunk_count: chunks.len() });

        if cancellation.is_cancelled() {
            return Err(RagError::Ingestion("cancelled".to_string()));
        }

        let chunk_count = chunks.len();
        self.store.delete_document(&document.id).await?;
        self.store.upsert(chunks).await?;
        on_progress.send(ProgressEvent::Stored { document_id: document.id.clone() });

        Ok(chunk_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::document::DocumentFormat;
    use crate::embedding::EmbeddingBackend;
    use crate::vectorstore::InMemoryVectorStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    struct StubBackend;

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        fn model_id(&self) -> &str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            1
        }
        async fn embed_batch_uncached(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            source_path: "test.txt".to_string(),
            format: DocumentFormat::Txt,
            byte_size: 11,
            uploaded_at: Utc::now(),
            topic_id: "t1".to_string(),
            tags: vec![],
            summary: None,
        }
    }

    #[tokio::test]
    async fn ingest_stores_embedded_chunks() {
        use std::io::Write;
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "hello world, this is a test document").unwrap();

        let loaders = Arc::new(LoaderRegistry::with_default_loaders());
        let chunker: Arc<dyn Chunker> =
            Arc::new(crate::chunker::RecursiveChunker::new(&sable_core::ChunkingConfig { window_size: 10, overlap_ratio: 0.1 }));
        let embeddings = Arc::new(EmbeddingProvider::new(Arc::new(StubBackend), Arc::new(EmbeddingCache::new(100)), 8));
        let store = Arc::new(InMemoryVectorStore::new());

        let pipeline = IngestionPipeline::new(loaders, chunker, embeddings, store.clone());
        let document = doc("doc1");
        let events = Mutex::new(Vec::new());
        let on_progress = |e: ProgressEvent| events.lock().unwrap().push(format!("{e:?}"));

        pipeline
            .ingest_file(&document, file.path(), &CancellationToken::new(), &on_progress)
            .await
            .unwrap();

        let results = store.search(&[5.0], 10, None).await.unwrap();
        assert!(!results.is_empty());
        assert!(events.lock().unwrap().iter().any(|e| e.contains("Completed")));
    }

    #[tokio::test]
    async fn cancellation_before_load_skips_storage() {
        use std::io::Write;
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "hello world").unwrap();

        let loaders = Arc::new(LoaderRegistry::with_default_loaders());
        let chunker: Arc<dyn Chunker> =
            Arc::new(crate::chunker::RecursiveChunker::new(&sable_core::ChunkingConfig::default()));
        let embeddings = Arc::new(EmbeddingProvider::new(Arc::new(StubBackend), Arc::new(EmbeddingCache::new(100)), 8));
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(loaders, chunker, embeddings, store.clone());

        let token = CancellationToken::new();
        token.cancel();
        let document = doc("doc2");
        let events = Mutex::new(Vec::new());
        let on_progress = |e: ProgressEvent| events.lock().unwrap().push(format!("{e:?}"));

        let result = pipeline.ingest_file(&document, file.path(), &token, &on_progress).await;
        assert!(result.is_err());

        let results = store.search(&[1.0], 10, None).await.unwrap();
        assert!(results.is_empty());
        assert!(events.lock().unwrap().iter().any(|e| e.contains("Cancelled")));
    }

    fn pipeline_for_tests(store: Arc<InMemoryVectorStore>) -> IngestionPipeline {
        let loaders = Arc::new(LoaderRegistry::with_default_loaders());
        let chunker: Arc<dyn Chunker> =
            Arc::new(crate::chunker::RecursiveChunker::new(&sable_core::ChunkingConfig { window_size: 10, overlap_ratio: 0.1 }));
        let embeddings = Arc::new(EmbeddingProvider::new(Arc::new(StubBackend), Arc::new(EmbeddingCache::new(100)), 8));
        IngestionPipeline::new(loaders, chunker, embeddings, store)
    }

    #[tokio::test]
    async fn process_files_registers_each_succeeding_document() {
        use std::io::Write;
        let mut file_a = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file_a, "first document body here").unwrap();
        let mut file_b = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file_b, "second document body here").unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_for_tests(store.clone());
        let repository = DocumentRepository::new(store);
        let topic = repository.create_topic("notes").await;

        let mut doc_a = doc("doc-a");
        doc_a.topic_id = topic.id.clone();
        let mut doc_b = doc("doc-b");
        doc_b.topic_id = topic.id.clone();

        let files = vec![(doc_a, file_a.path().to_path_buf()), (doc_b, file_b.path().to_path_buf())];
        let on_progress = |_e: ProgressEvent| {};

        let summary = pipeline
            .process_files(&files, &repository, &CancellationToken::new(), &on_progress)
            .await
            .unwrap();

        assert_eq!(summary.succeeded, vec!["doc-a".to_string(), "doc-b".to_string()]);
        assert!(summary.failed.is_empty());
        assert!(summary.total_chunks > 0);
        assert_eq!(repository.get_topic(&topic.id).await.unwrap().document_count, 2);
    }

    #[tokio::test]
    async fn process_files_rolls_back_committed_documents_on_cancel() {
        use std::io::Write;
        let mut file_a = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file_a, "first document body here").unwrap();
        let mut file_b = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file_b, "second document body here").unwrap();

        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline_for_tests(store.clone());
        let repository = DocumentRepository::new(store.clone());
        let topic = repository.create_topic("notes").await;

        let mut doc_a = doc("doc-a");
        doc_a.topic_id = topic.id.clone();
        let mut doc_b = doc("doc-b");
        doc_b.topic_id = topic.id.clone();

        let token = CancellationToken::new();
        let cancel_after_first = &token;
        let files = vec![(doc_a, file_a.path().to_path_buf()), (doc_b, file_b.path().to_path_buf())];
        let on_progress = |e: ProgressEvent| {
            if let ProgressEvent::Completed { document_id } = &e {
                if document_id == "doc-a" {
                    cancel_after_first.cancel();
                }
            }
        };

        let result = pipeline.process_files(&files, &repository, &token, &on_progress).await;

        assert!(result.is_err());
        assert!(repository.get_document("doc-a").await.is_none());
        assert_eq!(repository.get_topic(&topic.id).await.unwrap().document_count, 0);
        assert!(store.search(&[5.0], 10, None).await.unwrap().is_empty());
    }
}
