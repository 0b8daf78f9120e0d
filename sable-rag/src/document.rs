//! Data types for documents, chunks, topics, and search results (§3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-supplied source file, assigned a stable identifier at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub source_path: String,
    pub format: DocumentFormat,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub topic_id: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

/// Format tag dispatched on by the [`crate::loader::LoaderRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Xls,
    Csv,
    Txt,
    Ppt,
    Pptx,
    Json,
    Ocr,
}

impl DocumentFormat {
    /// Infer a format tag from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "csv" => Some(Self::Csv),
            "txt" | "md" => Some(Self::Txt),
            "ppt" => Some(Self::Ppt),
            "pptx" => Some(Self::Pptx),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
            Self::Json => "json",
            Self::Ocr => "ocr",
        }
    }
}

/// A named collection used as a retrieval scope filter (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub document_count: u64,
}

/// A raw `{page_content, metadata}` record produced by a [`crate::loader`].
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub page_content: String,
    pub metadata: HashMap<String, String>,
}

/// An atomic retrievable unit (§3). `text` is plaintext in memory; the
/// ingestion pipeline and vector store are responsible for at-rest
/// encryption (§4.3) — the struct itself never carries ciphertext so that
/// application code cannot accidentally persist or transmit it unencrypted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

/// A retrieved [`Chunk`] paired with a relevance score, descending by
/// score (§4.2, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}
