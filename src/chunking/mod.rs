//! Recursive character splitting with overlap
//!
//! Text is split on a prioritized list of separators, coarsest first. Pieces are merged
//! greedily up to the size budget; a piece that is still too large is split again with the
//! next separator. Separators stay attached to the piece they terminate, so the split never
//! drops a character. The empty separator means a hard split on character boundaries.

use crate::config::ChunkingConfig;
use crate::document::{Chunk, Document};
use crate::error::{RaglineError, Result};
use serde_json::Value;

/// Default separators, coarsest to finest
pub const DEFAULT_SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", ". ", "! ", "? ", "；", "; ", "，", ", ", " ", "",
];

/// One output chunk and how many of its leading characters repeat the previous chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub text: String,
    /// Leading characters duplicated from the tail of the previous chunk
    pub overlap: usize,
}

impl ChunkSpan {
    /// The part of this chunk that is not overlap
    pub fn fresh_text(&self) -> String {
        self.text.chars().skip(self.overlap).collect()
    }
}

/// Splits text into overlapping chunks of at most `chunk_size` characters
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    strip_whitespace: bool,
}

impl TextSplitter {
    /// Create a splitter with the default separators
    ///
    /// Fails with `InvalidChunkParams` unless `chunk_size > 0` and `overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RaglineError::InvalidChunkParams {
                chunk_size,
                overlap: chunk_overlap,
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            strip_whitespace: false,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?
            .with_separators(config.separators.iter().cloned())
            .with_strip_whitespace(config.strip_whitespace))
    }

    /// Replace the separator list (coarsest first)
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Trim every chunk and drop whitespace-only chunks
    pub fn with_strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = strip;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split into chunks, keeping track of the overlap prefix of each one
    ///
    /// Dropping `overlap` leading characters from every span and concatenating the rest
    /// yields `content` exactly.
    pub fn split_spans(&self, content: &str) -> Result<Vec<ChunkSpan>> {
        if content.trim().is_empty() {
            return Err(RaglineError::EmptyInput);
        }

        let mut bases = Vec::new();
        self.split_recursive(content, &self.separators, &mut bases);

        let mut spans = Vec::with_capacity(bases.len());
        for (i, base) in bases.iter().enumerate() {
            if i == 0 || self.chunk_overlap == 0 {
                spans.push(ChunkSpan {
                    text: base.clone(),
                    overlap: 0,
                });
                continue;
            }

            let previous = &bases[i - 1];
            let previous_len = previous.chars().count();
            let take = self.chunk_overlap.min(previous_len);
            let mut text: String = previous.chars().skip(previous_len - take).collect();
            text.push_str(base);
            spans.push(ChunkSpan {
                text,
                overlap: take,
            });
        }

        Ok(spans)
    }

    /// Split into chunk texts
    pub fn split(&self, content: &str) -> Result<Vec<String>> {
        let spans = self.split_spans(content)?;

        if !self.strip_whitespace {
            return Ok(spans.into_iter().map(|s| s.text).collect());
        }

        Ok(spans
            .into_iter()
            .map(|s| s.text.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Split a document into chunks carrying its metadata
    ///
    /// Each chunk gets `chunk_index`, `total_chunks` and `chunk_size` added to a copy of the
    /// document metadata.
    pub fn chunk_document(&self, document: &Document) -> Result<Vec<Chunk>> {
        let texts = self.split(&document.content)?;
        let total = texts.len();

        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".into(), Value::from(i));
                metadata.insert("total_chunks".into(), Value::from(total));
                metadata.insert("chunk_size".into(), Value::from(text.chars().count()));

                Chunk {
                    id: None,
                    content: text,
                    metadata,
                    source_index: i,
                    total_chunks: total,
                }
            })
            .collect())
    }

    /// Characters available to a chunk before its overlap prefix is added
    fn budget(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    fn split_recursive(&self, text: &str, separators: &[String], out: &mut Vec<String>) {
        let budget = self.budget();

        let Some(position) = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
        else {
            // Nothing left to split on: emit the oversized piece whole
            out.push(text.to_string());
            return;
        };

        let separator = &separators[position];
        let finer = &separators[position + 1..];

        if separator.is_empty() {
            hard_split(text, budget, out);
            return;
        }

        let mut current = String::new();
        let mut current_len = 0;

        for piece in text.split_inclusive(separator.as_str()) {
            let len = piece.chars().count();

            if len > budget {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                self.split_recursive(piece, finer, out);
            } else if current_len + len <= budget {
                current.push_str(piece);
                current_len += len;
            } else {
                out.push(std::mem::take(&mut current));
                current.push_str(piece);
                current_len = len;
            }
        }

        if !current.is_empty() {
            out.push(current);
        }
    }
}

fn hard_split(text: &str, budget: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    for window in chars.chunks(budget) {
        out.push(window.iter().collect());
    }
}

/// Split `content` with the default separators
pub fn split_text(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    TextSplitter::new(chunk_size, overlap)?.split(content)
}
