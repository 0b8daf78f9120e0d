//! Recursive character-window chunker (C5).
//!
//! Splits on the highest-priority separator that still respects
//! `window_size`, falling through to lower-priority separators and finally
//! a raw character window. Overlap is `round(window_size * overlap_ratio)`
//! characters, carried forward as a literal prefix of the next chunk so
//! retrieval context survives a window boundary.

use std::collections::HashMap;

use sable_core::ChunkingConfig;

use crate::document::Chunk;

/// Default separators in priority order: paragraph break, sentence breaks,
/// line break, whitespace. The empty string is an implicit final fallback
/// (character-level window).
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", ". ", "! ", "? ", "\n", " "];

/// A strategy for splitting a document's full text into overlapping
/// windows. Implementations produce [`Chunk`]s with text and metadata but
/// no embedding — the ingestion pipeline attaches embeddings afterward.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks belonging to `document_id`, inheriting
    /// `base_metadata` plus a `chunk_index` field per chunk. Returns an
    /// empty `Vec` for empty text.
    fn chunk(
        &self,
        document_id: &str,
        text: &str,
        base_metadata: &HashMap<String, String>,
    ) -> Vec<Chunk>;
}

fn overlap_chars(window_size: usize, overlap_ratio: f32) -> usize {
    ((window_size as f32) * overlap_ratio).round() as usize
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Plain character-window split with overlap; the final fallback when no
/// separator can further subdivide a too-long segment.
fn windowed_split(text: &str, window_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let step = window_size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + window_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

/// Split `text` at every occurrence of `separator`, keeping the separator
/// attached to the preceding segment.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }
    let mut result = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        result.push(text[start..].to_string());
    }
    result
}

/// Recursively split `text` by the highest-priority separator still
/// available, merging segments up to `window_size` and seeding each new
/// chunk with `overlap` characters carried over from the previous one.
fn recursive_split(text: &str, window_size: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= window_size || separators.is_empty() {
        return windowed_split(text, window_size, overlap);
    }

    let separator = separators[0];
    let remaining = &separators[1..];
    let segments = split_keeping_separator(text, separator);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String, chunks: &mut Vec<String>| {
        if current.is_empty() {
            return;
        }
        if char_len(current) > window_size {
            chunks.extend(recursive_split(current, window_size, overlap, remaining));
        } else {
            chunks.push(current.clone());
        }
        current.clear();
    };

    for segment in segments {
        if current.is_empty() {
            current = segment;
            continue;
        }
        if char_len(&current) + char_len(&segment) <= window_size {
            current.push_str(&segment);
            continue;
        }
        flush(&mut current, &mut chunks);
        let seed = chunks.last().map(|c| tail_chars(c, overlap)).unwrap_or_default();
        current = format!("{seed}{segment}");
    }
    flush(&mut current, &mut chunks);

    chunks
}

/// Recursively splits text hierarchically by paragraph, sentence, line,
/// then whitespace, falling back to a raw character window.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    window_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self::with_separators(config, DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_separators(config: &ChunkingConfig, separators: Vec<String>) -> Self {
        Self {
            window_size: config.window_size,
            overlap: overlap_chars(config.window_size, config.overlap_ratio),
            separators,
        }
    }

    fn build_chunks(
        &self,
        document_id: &str,
        raw_chunks: Vec<String>,
        base_metadata: &HashMap<String, String>,
    ) -> Vec<Chunk> {
        raw_chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| {
                let mut metadata = base_metadata.clone();
                metadata.insert("chunk_index".to_string(), ordinal.to_string());
                Chunk {
                    id: format!("{document_id}_{ordinal}"),
                    document_id: document_id.to_string(),
                    ordinal,
                    text,
                    embedding: Vec::new(),
                    metadata,
                }
            })
            .collect()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(
        &self,
        document_id: &str,
        text: &str,
        base_metadata: &HashMap<String, String>,
    ) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }
        let separators: Vec<&str> = self.separators.iter().map(|s| s.as_str()).collect();
        let raw = recursive_split(text, self.window_size, self.overlap, &separators);
        self.build_chunks(document_id, raw, base_metadata)
    }
}

/// A language-aware chunker for source code: prefers blank-line block
/// boundaries and single newlines over mid-token splits, only falling back
/// to whitespace/character windows for a single oversized block.
#[derive(Debug, Clone)]
pub struct CodeChunker {
    inner: RecursiveChunker,
}

impl CodeChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        let separators = vec!["\n\n".to_string(), "\n".to_string(), " ".to_string()];
        Self { inner: RecursiveChunker::with_separators(config, separators) }
    }
}

impl Chunker for CodeChunker {
    fn chunk(
        &self,
        document_id: &str,
        text: &str,
        base_metadata: &HashMap<String, String>,
    ) -> Vec<Chunk> {
        self.inner.chunk(document_id, text, base_metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window_size: usize, overlap_ratio: f32) -> ChunkingConfig {
        ChunkingConfig { window_size, overlap_ratio }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(&config(50, 0.2));
        assert!(chunker.chunk("doc1", "", &HashMap::new()).is_empty());
    }

    #[test]
    fn s1_two_paragraph_document() {
        let text = "The capital of France is Paris.\n\nThe Eiffel Tower is in Paris.";
        let chunker = RecursiveChunker::new(&config(50, 0.2));
        let chunks = chunker.chunk("alpha", text, &HashMap::new());

        assert!(chunks.len() >= 2 && chunks.len() <= 3, "expected 2-3 chunks, got {}", chunks.len());
        assert!(chunks[0].text.contains("Paris"));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert_eq!(c.metadata.get("chunk_index").unwrap(), &i.to_string());
        }
    }

    #[test]
    fn preserves_source_ordinal() {
        let text = "a ".repeat(100);
        let chunker = RecursiveChunker::new(&config(20, 0.1));
        let chunks = chunker.chunk("doc", &text, &HashMap::new());
        let ordinals: Vec<usize> = chunks.iter().map(|c| c.ordinal).collect();
        let expected: Vec<usize> = (0..chunks.len()).collect();
        assert_eq!(ordinals, expected);
    }

    #[test]
    fn handles_multibyte_text_without_panicking() {
        let text = "北京市是中国的首都。".repeat(10);
        let chunker = RecursiveChunker::new(&config(15, 0.2));
        let chunks = chunker.chunk("doc", &text, &HashMap::new());
        assert!(!chunks.is_empty());
    }

    #[test]
    fn code_chunker_respects_blank_line_blocks() {
        let text = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let chunker = CodeChunker::new(&config(12, 0.1));
        let chunks = chunker.chunk("code.rs", text, &HashMap::new());
        assert!(!chunks.is_empty());
    }
}
