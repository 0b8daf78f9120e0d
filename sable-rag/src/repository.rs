//! Topic and document bookkeeping (§3, §4.6 cascade delete).
//!
//! This is metadata only — the chunk text and vectors live in the
//! [`crate::vectorstore::VectorStore`]. Deleting a document here cascades
//! into the store so a dangling document row never outlives its chunks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{Document, Topic};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// In-process Topic/Document metadata store with cascade delete into a
/// [`VectorStore`]. A persistence-backed implementation would follow the
/// same contract against a `documents`/`topics` table pair.
pub struct DocumentRepository {
    store: Arc<dyn VectorStore>,
    topics: RwLock<HashMap<String, Topic>>,
    documents: RwLock<HashMap<String, Document>>,
}

impl DocumentRepository {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store, topics: RwLock::new(HashMap::new()), documents: RwLock::new(HashMap::new()) }
    }

    pub async fn create_topic(&self, name: impl Into<String>) -> Topic {
        let topic = Topic { id: Uuid::new_v4().to_string(), name: name.into(), document_count: 0 };
        self.topics.write().await.insert(topic.id.clone(), topic.clone());
        topic
    }

    pub async fn get_topic(&self, topic_id: &str) -> Option<Topic> {
        self.topics.read().await.get(topic_id).cloned()
    }

    pub async fn list_topics(&self) -> Vec<Topic> {
        self.topics.read().await.values().cloned().collect()
    }

    /// Register a document under an existing topic, bumping that topic's
    /// count.
    pub async fn register_document(&self, document: Document) -> Result<()> {
        let mut topics = self.topics.write().await;
        let topic = topics
            .get_mut(&document.topic_id)
            .ok_or_else(|| RagError::Ingestion(format!("unknown topic: {}", document.topic_id)))?;
        topic.document_count += 1;
        self.documents.write().await.insert(document.id.clone(), document);
        Ok(())
    }

    pub async fn get_document(&self, document_id: &str) -> Option<Document> {
        self.documents.read().await.get(document_id).cloned()
    }

    pub async fn list_documents(&self, topic_id: Option<&str>) -> Vec<Document> {
        self.documents
            .read()
            .await
            .values()
            .filter(|d| topic_id.map(|t| d.topic_id == t).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Remove a document's metadata and cascade-delete its chunks from the
    /// vector store.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let removed = self.documents.write().await.remove(document_id);
        if let Some(document) = removed {
            if let Some(topic) = self.topics.write().await.get_mut(&document.topic_id) {
                topic.document_count = topic.document_count.saturating_sub(1);
            }
        }
        self.store.delete_document(document_id).await
    }

    /// Remove a topic and cascade-delete every document under it.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<()> {
        let document_ids: Vec<String> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.topic_id == topic_id)
            .map(|d| d.id.clone())
            .collect();

        for document_id in document_ids {
            self.delete_document(&document_id).await?;
        }
        self.topics.write().await.remove(topic_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentFormat;
    use crate::vectorstore::InMemoryVectorStore;
    use chrono::Utc;

    fn document(id: &str, topic_id: &str) -> Document {
        Document {
            id: id.to_string(),
            source_path: "x.txt".to_string(),
            format: DocumentFormat::Txt,
            byte_size: 0,
            uploaded_at: Utc::now(),
            topic_id: topic_id.to_string(),
            tags: vec![],
            summary: None,
        }
    }

    #[tokio::test]
    async fn registering_document_bumps_topic_count() {
        let repo = DocumentRepository::new(Arc::new(InMemoryVectorStore::new()));
        let topic = repo.create_topic("finance").await;
        repo.register_document(document("d1", &topic.id)).await.unwrap();

        let reloaded = repo.get_topic(&topic.id).await.unwrap();
        assert_eq!(reloaded.document_count, 1);
    }

    #[tokio::test]
    async fn deleting_topic_cascades_to_documents() {
        let repo = DocumentRepository::new(Arc::new(InMemoryVectorStore::new()));
        let topic = repo.create_topic("finance").await;
        repo.register_document(document("d1", &topic.id)).await.unwrap();
        repo.register_document(document("d2", &topic.id)).await.unwrap();

        repo.delete_topic(&topic.id).await.unwrap();

        assert!(repo.list_documents(None).await.is_empty());
        assert!(repo.get_topic(&topic.id).await.is_none());
    }

    #[tokio::test]
    async fn registering_under_unknown_topic_fails() {
        let repo = DocumentRepository::new(Arc::new(InMemoryVectorStore::new()));
        let err = repo.register_document(document("d1", "missing")).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }
}
