//! LRU embedding cache (§3 `EmbeddingCacheEntry`, §4.1).
//!
//! Keyed by `sha256(model_id ∥ text)`, so switching `embedding.model_id`
//! structurally cannot return a stale vector for a different model: the key
//! itself changes (invariant 6 in §3). Eviction is least-recently-used at a
//! configurable capacity, matching the "Embedding cache" row of the
//! concurrency model (concurrent reads, CAS-like writes under one internal
//! lock).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

struct CacheEntry {
    vector: Vec<f32>,
    last_access: u64,
}

/// A least-recently-used cache of embedding vectors.
pub struct EmbeddingCache {
    capacity: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    tick: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: RwLock::new(HashMap::new()), tick: AtomicU64::new(0) }
    }

    fn key(model_id: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(&self, model_id: &str, text: &str) -> Option<Vec<f32>> {
        let key = Self::key(model_id, text);
        let mut entries = self.entries.write().await;
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let entry = entries.get_mut(&key)?;
        entry.last_access = tick;
        Some(entry.vector.clone())
    }

    pub async fn put(&self, model_id: &str, text: &str, vector: Vec<f32>) {
        let key = Self::key(model_id, text);
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { vector, last_access: tick });

        if entries.len() > self.capacity {
            if let Some(evict_key) =
                entries.iter().min_by_key(|(_, e)| e.last_access).map(|(k, _)| k.clone())
            {
                entries.remove(&evict_key);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
