//! Vector store (C6, §4.2): per-embedding-model persistence of chunks plus
//! brute-force cosine-similarity search with metadata filtering.
//!
//! Chunk text is encrypted at rest (§4.3); embeddings are always stored
//! plaintext since similarity search needs them untransformed. Deletes are
//! tombstones (`deleted_at` set) so [`VectorStore::compact`] can reclaim
//! space after a grace window instead of making deletion itself a
//! synchronous, store-wide rewrite.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tokio::sync::RwLock;

use crate::crypto::ChunkEncryptor;
use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use sable_core::MetadataFilter;

/// Approximate on-disk size of a chunk's encrypted text, embedding, and
/// metadata, for compaction summaries.
fn entry_byte_size(chunk: &Chunk) -> u64 {
    let embedding_bytes = (chunk.embedding.len() * std::mem::size_of::<f32>()) as u64;
    let metadata_bytes: u64 = chunk.metadata.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
    chunk.text.len() as u64 + embedding_bytes + metadata_bytes
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Result of a [`VectorStore::compact`] call (§4.2). Compacting twice in a
/// row with no intervening deletes yields `reclaimed_bytes = 0` on the
/// second call since there are no tombstones left past the grace window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompactionSummary {
    pub before_rows: usize,
    pub after_rows: usize,
    pub reclaimed_bytes: u64,
}

/// Persists chunks for one embedding model and serves nearest-neighbor
/// search. Implementations never return a chunk with a mismatched
/// embedding dimension silently; callers are expected to only search with
/// vectors the backing model produced.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite chunks by id.
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Return the top `k` chunks by cosine similarity to `query_vector`,
    /// restricted to chunks matching `filter` when present. Descending by
    /// score (§4.2).
    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// Tombstone every chunk belonging to `document_id`.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Permanently remove tombstones older than `grace`, returning a
    /// summary of rows and bytes reclaimed. Callers must reject a zero
    /// grace window at the configuration layer (§4.2 B-window invariant)
    /// — this method trusts its input.
    async fn compact(&self, grace: Duration) -> Result<CompactionSummary>;
}

#[derive(Clone)]
struct InMemoryEntry {
    chunk: Chunk,
    deleted_at: Option<DateTime<Utc>>,
}

/// An in-process [`VectorStore`] backed by a `HashMap`, used in tests and
/// as the default store before a persistence backend is configured.
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<String, InMemoryEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for chunk in chunks {
            entries.insert(chunk.id.clone(), InMemoryEntry { chunk, deleted_at: None });
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<SearchResult> = entries
            .values()
            .filter(|e| e.deleted_at.is_none())
            .filter(|e| filter.map(|f| f.matches(&e.chunk.metadata)).unwrap_or(true))
            .map(|e| SearchResult { chunk: e.chunk.clone(), score: cosine_similarity(query_vector, &e.chunk.embedding) })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        for entry in entries.values_mut() {
            if entry.chunk.document_id == document_id {
                entry.deleted_at = Some(now);
            }
        }
        Ok(())
    }

    async fn compact(&self, grace: Duration) -> Result<CompactionSummary> {
        if grace.is_zero() {
            return Err(RagError::Config("compaction grace window must be > 0".to_string()));
        }
        let mut entries = self.entries.write().await;
        let before_rows = entries.len();
        let now = Utc::now();
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| RagError::Config(format!("grace window out of range: {e}")))?;

        let mut reclaimed_bytes = 0u64;
        entries.retain(|_, e| match e.deleted_at {
            Some(deleted_at) if now - deleted_at >= grace => {
                reclaimed_bytes += entry_byte_size(&e.chunk);
                false
            }
            _ => true,
        });

        Ok(CompactionSummary { before_rows, after_rows: entries.len(), reclaimed_bytes })
    }
}

/// A SQLite-backed [`VectorStore`]. One pool (and database file) per
/// embedding model — the model id never enters a WHERE clause because it
/// never needs to (§3 invariant 6: a store only ever holds vectors from
/// one model).
pub struct SqliteVectorStore {
    pool: SqlitePool,
    encryptor: Arc<ChunkEncryptor>,
}

impl SqliteVectorStore {
    /// `pool` must already point at a per-model database; this does not
    /// create or migrate the schema.
    pub fn new(pool: SqlitePool, encryptor: Arc<ChunkEncryptor>) -> Self {
        Self { pool, encryptor }
    }

    /// Create the `chunks` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                ciphertext BLOB NOT NULL,
                embedding TEXT NOT NULL,
                metadata TEXT NOT NULL,
                deleted_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in &chunks {
            let ciphertext = self.encryptor.encrypt(&chunk.text)?;
            let embedding_json = serde_json::to_string(&chunk.embedding)?;
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                "INSERT INTO chunks (id, document_id, ordinal, ciphertext, embedding, metadata, deleted_at)
                 VALUES (?, ?, ?, ?, ?, ?, NULL)
                 ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    ordinal = excluded.ordinal,
                    ciphertext = excluded.ciphertext,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    deleted_at = NULL",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.ordinal as i64)
            .bind(ciphertext)
            .bind(embedding_json)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query(
            "SELECT id, document_id, ordinal, ciphertext, embedding, metadata FROM chunks WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            let document_id: String = row.try_get("document_id")?;
            let ordinal: i64 = row.try_get("ordinal")?;
            let ciphertext: Vec<u8> = row.try_get("ciphertext")?;
            let embedding_json: String = row.try_get("embedding")?;
            let metadata_json: String = row.try_get("metadata")?;

            let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json)?;
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }

            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)?;
            let text = self.encryptor.decrypt(&ciphertext)?;
            let chunk = Chunk { id, document_id, ordinal: ordinal as usize, text, embedding, metadata };
            let score = cosine_similarity(query_vector, &chunk.embedding);
            scored.push(SearchResult { chunk, score });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET deleted_at = ? WHERE document_id = ? AND deleted_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compact(&self, grace: Duration) -> Result<CompactionSummary> {
        if grace.is_zero() {
            return Err(RagError::Config("compaction grace window must be > 0".to_string()));
        }
        let cutoff = Utc::now() - chrono::Duration::from_std(grace)
            .map_err(|e| RagError::Config(format!("grace window out of range: {e}")))?;

        let mut tx = self.pool.begin().await?;

        let before_rows: i64 = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;

        let reclaimed_bytes: i64 = sqlx::query(
            "SELECT COALESCE(SUM(LENGTH(ciphertext) + LENGTH(embedding) + LENGTH(metadata)), 0) AS n
             FROM chunks WHERE deleted_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?
        .try_get("n")?;

        sqlx::query("DELETE FROM chunks WHERE deleted_at IS NOT NULL AND deleted_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let after_rows: i64 = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&mut *tx)
            .await?
            .try_get("n")?;

        tx.commit().await?;

        Ok(CompactionSummary {
            before_rows: before_rows as usize,
            after_rows: after_rows as usize,
            reclaimed_bytes: reclaimed_bytes as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, document_id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            ordinal: 0,
            text: "hello".to_string(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                chunk("a", "doc1", vec![1.0, 0.0]),
                chunk("b", "doc1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].chunk.id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn delete_document_tombstones_its_chunks() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![chunk("a", "doc1", vec![1.0, 0.0])]).await.unwrap();
        store.delete_document("doc1").await.unwrap();

        let results = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn compact_rejects_zero_grace_window() {
        let store = InMemoryVectorStore::new();
        let err = store.compact(Duration::from_secs(0)).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn compacting_twice_reclaims_nothing_the_second_time() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![chunk("a", "doc1", vec![1.0, 0.0])]).await.unwrap();
        store.delete_document("doc1").await.unwrap();

        let first = store.compact(Duration::from_nanos(1)).await.unwrap();
        assert_eq!(first.before_rows, 1);
        assert_eq!(first.after_rows, 0);
        assert!(first.reclaimed_bytes > 0);

        let second = store.compact(Duration::from_nanos(1)).await.unwrap();
        assert_eq!(second.before_rows, 0);
        assert_eq!(second.after_rows, 0);
        assert_eq!(second.reclaimed_bytes, 0);
    }

    #[tokio::test]
    async fn search_respects_metadata_filter() {
        let store = InMemoryVectorStore::new();
        let mut a = chunk("a", "doc1", vec![1.0, 0.0]);
        a.metadata.insert("topic".to_string(), "finance".to_string());
        let mut b = chunk("b", "doc1", vec![1.0, 0.0]);
        b.metadata.insert("topic".to_string(), "sports".to_string());
        store.upsert(vec![a, b]).await.unwrap();

        let filter = MetadataFilter::eq("topic", "finance");
        let results = store.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "a");
    }
}
