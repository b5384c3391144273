//! Documents, chunks and their metadata

use crate::error::{RaglineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Free-form metadata attached to documents and chunks
pub type Metadata = BTreeMap<String, Value>;

/// Chunk identifier, unique within one index and never reused
pub type ChunkId = u64;

/// A source document supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata value
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a UTF-8 text file into a document
    ///
    /// File provenance (`source`, `filename`, `file_extension`, `file_size`) is added
    /// first; caller-supplied metadata wins on key collisions.
    pub fn from_file(path: &Path, extra: Metadata) -> Result<Self> {
        if !path.is_file() {
            return Err(RaglineError::Io {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a regular file"),
                context: format!("Cannot read document {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to read document {}", path.display()),
        })?;

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), Value::from(path.display().to_string()));
        metadata.insert("filename".into(), Value::from(filename));
        metadata.insert("file_extension".into(), Value::from(extension));
        metadata.insert("file_size".into(), Value::from(file_size));
        metadata.extend(extra);

        Ok(Self { content, metadata })
    }
}

/// A bounded segment of one source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Assigned by the index on insertion; may be pre-assigned by the caller
    pub id: Option<ChunkId>,
    pub content: String,
    pub metadata: Metadata,
    /// Position of this chunk within its parent document (0-based)
    pub source_index: usize,
    /// Number of chunks the parent document was split into
    pub total_chunks: usize,
}

impl Chunk {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata,
            source_index: 0,
            total_chunks: 1,
        }
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let head: String = self.content.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }

    /// Look up a metadata value as a string
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// True when every key/value pair of `filter` is present in `metadata` with an equal value
pub fn metadata_matches(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_filter_matching() {
        let mut meta = Metadata::new();
        meta.insert("source".into(), json!("doc1"));
        meta.insert("page".into(), json!(3));

        let mut filter = Metadata::new();
        filter.insert("source".into(), json!("doc1"));
        assert!(metadata_matches(&meta, &filter));

        filter.insert("page".into(), json!("3"));
        assert!(!metadata_matches(&meta, &filter)); // type matters

        assert!(metadata_matches(&meta, &Metadata::new()));
    }

    #[test]
    fn test_document_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.md");
        std::fs::write(&path, "hello world").unwrap();

        let mut extra = Metadata::new();
        extra.insert("category".into(), json!("notes"));

        let doc = Document::from_file(&path, extra).unwrap();
        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.metadata["filename"], json!("notes.md"));
        assert_eq!(doc.metadata["file_extension"], json!(".md"));
        assert_eq!(doc.metadata["file_size"], json!(11));
        assert_eq!(doc.metadata["category"], json!("notes"));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Document::from_file(&temp.path().join("nope.txt"), Metadata::new());
        assert!(matches!(result, Err(RaglineError::Io { .. })));
    }

    #[test]
    fn test_preview_counts_chars() {
        let chunk = Chunk::new("深度学习是机器学习的一个子集", Metadata::new());
        assert_eq!(chunk.preview(4), "深度学习...");
    }
}
