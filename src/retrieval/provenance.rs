//! Scored results and source attribution

use crate::document::{Chunk, ChunkId};
use crate::retrieval::SearchMethod;
use serde::{Deserialize, Serialize};

/// A chunk with relevance score and the method that produced it
///
/// Score meaning depends on `method`: cosine similarity for semantic, BM25 for lexical,
/// weighted reciprocal-rank score for single-query hybrid, and appearance count when
/// several query variants were fused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    pub method: SearchMethod,
}

impl RetrievalResult {
    pub fn new(chunk: Chunk, score: f32, method: SearchMethod) -> Self {
        Self {
            chunk,
            score,
            method,
        }
    }

    pub fn id(&self) -> Option<ChunkId> {
        self.chunk.id
    }

    /// Source label for this result at 1-based `position`
    pub fn label(&self, position: usize) -> String {
        source_label(&self.chunk, position)
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        self.chunk.preview(max_chars)
    }
}

/// Human-readable provenance: `title`, then `source`, then `filename`, then `Document {i}`
pub fn source_label(chunk: &Chunk, position: usize) -> String {
    ["title", "source", "filename"]
        .iter()
        .find_map(|key| chunk.meta_str(key).filter(|v| !v.trim().is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Document {}", position))
}
