//! Typed tool requests
//!
//! Requests arrive as `{"tool": "<name>", "arguments": {...}}` JSON and are checked by
//! [`ToolRequest::validate`] before anything reaches the pipeline.

use crate::document::{Document, Metadata};
use crate::error::{RaglineError, Result};
use crate::generation::{AnswerStyle, SummaryKind};
use crate::retrieval::SearchMethod;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

fn default_k() -> usize {
    5
}

fn default_summary_length() -> usize {
    500
}

/// Optional per-request chunking parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<usize>,
}

impl ChunkOverride {
    pub fn is_empty(&self) -> bool {
        self.chunk_size.is_none() && self.chunk_overlap.is_none()
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(RaglineError::InvalidChunkParams {
                chunk_size: 0,
                overlap: self.chunk_overlap.unwrap_or(0),
            });
        }
        if let (Some(size), Some(overlap)) = (self.chunk_size, self.chunk_overlap) {
            if overlap >= size {
                return Err(RaglineError::InvalidChunkParams {
                    chunk_size: size,
                    overlap,
                });
            }
        }
        Ok(())
    }
}

/// One operation requested through the tool boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolRequest {
    AddDocument {
        content: String,
        #[serde(default)]
        metadata: Metadata,
        #[serde(flatten)]
        chunking: ChunkOverride,
    },
    AddFile {
        path: PathBuf,
        #[serde(default)]
        metadata: Metadata,
        #[serde(flatten)]
        chunking: ChunkOverride,
    },
    BatchAdd {
        documents: Vec<Document>,
        #[serde(flatten)]
        chunking: ChunkOverride,
    },
    Search {
        query: String,
        #[serde(default = "default_k")]
        k: usize,
        #[serde(default)]
        method: Option<SearchMethod>,
        #[serde(default)]
        filter: Option<Metadata>,
        #[serde(default)]
        expand: bool,
    },
    /// Semantic-only search that can drop weak matches
    SemanticSearch {
        query: String,
        #[serde(default = "default_k")]
        k: usize,
        #[serde(default)]
        filter: Option<Metadata>,
        /// Minimum cosine similarity a hit must reach
        #[serde(default)]
        score_threshold: Option<f32>,
    },
    AnswerQuestion {
        question: String,
        #[serde(default = "default_k")]
        k: usize,
        #[serde(default)]
        method: Option<SearchMethod>,
        #[serde(default)]
        style: AnswerStyle,
        #[serde(default)]
        structured: bool,
        #[serde(default)]
        expand: bool,
    },
    Summarize {
        topic: String,
        #[serde(default)]
        kind: SummaryKind,
        #[serde(default = "default_summary_length")]
        max_length: usize,
        #[serde(default = "default_k")]
        k: usize,
    },
    /// One chat turn; `session` is an id or name, and a new name starts a session
    MultiTurnChat {
        message: String,
        #[serde(default)]
        session: Option<String>,
        #[serde(default = "default_k")]
        k: usize,
    },
    ListDocuments {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        filter: Option<Metadata>,
    },
    DeleteDocuments {
        #[serde(default)]
        filter: Metadata,
        #[serde(default)]
        confirm: bool,
    },
    ClearCollection {
        #[serde(default)]
        confirm: bool,
    },
    GetStats,
}

impl ToolRequest {
    /// Parse a JSON request
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RaglineError::Json {
            source: e,
            context: "Invalid tool request".to_string(),
        })
    }

    /// Wire name of the tool
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddDocument { .. } => "add_document",
            Self::AddFile { .. } => "add_file",
            Self::BatchAdd { .. } => "batch_add",
            Self::Search { .. } => "search",
            Self::SemanticSearch { .. } => "semantic_search",
            Self::AnswerQuestion { .. } => "answer_question",
            Self::Summarize { .. } => "summarize",
            Self::MultiTurnChat { .. } => "multi_turn_chat",
            Self::ListDocuments { .. } => "list_documents",
            Self::DeleteDocuments { .. } => "delete_documents",
            Self::ClearCollection { .. } => "clear_collection",
            Self::GetStats => "get_stats",
        }
    }

    /// Reject arguments the pipeline would fail on
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AddDocument {
                content, chunking, ..
            } => {
                if content.trim().is_empty() {
                    return Err(RaglineError::EmptyInput);
                }
                chunking.validate()
            }
            Self::AddFile { path, chunking, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(RaglineError::InvalidRequest(
                        "path cannot be empty".to_string(),
                    ));
                }
                chunking.validate()
            }
            Self::BatchAdd {
                documents,
                chunking,
            } => {
                if documents.is_empty() {
                    return Err(RaglineError::InvalidRequest(
                        "documents cannot be empty".to_string(),
                    ));
                }
                if let Some(i) = documents.iter().position(|d| d.content.trim().is_empty()) {
                    return Err(RaglineError::InvalidRequest(format!(
                        "document {} has empty content",
                        i
                    )));
                }
                chunking.validate()
            }
            Self::Search { query, k, .. } | Self::AnswerQuestion { question: query, k, .. } => {
                check_query(query, *k)
            }
            Self::SemanticSearch {
                query,
                k,
                score_threshold,
                ..
            } => {
                check_query(query, *k)?;
                if let Some(threshold) = score_threshold {
                    if !(-1.0..=1.0).contains(threshold) {
                        return Err(RaglineError::InvalidQuery(format!(
                            "score_threshold must be within [-1, 1], got {}",
                            threshold
                        )));
                    }
                }
                Ok(())
            }
            Self::MultiTurnChat {
                message,
                session,
                k,
            } => {
                check_query(message, *k)?;
                if session.as_deref().is_some_and(|s| s.trim().is_empty()) {
                    return Err(RaglineError::InvalidRequest(
                        "session cannot be blank".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Summarize {
                topic,
                k,
                max_length,
                ..
            } => {
                check_query(topic, *k)?;
                if *max_length == 0 {
                    return Err(RaglineError::InvalidRequest(
                        "max_length must be greater than 0".to_string(),
                    ));
                }
                Ok(())
            }
            Self::ListDocuments { limit, .. } => {
                if *limit == Some(0) {
                    return Err(RaglineError::InvalidRequest(
                        "limit must be greater than 0".to_string(),
                    ));
                }
                Ok(())
            }
            Self::DeleteDocuments { filter, confirm } => {
                if filter.is_empty() && !confirm {
                    return Err(RaglineError::UnsafeDelete);
                }
                Ok(())
            }
            Self::ClearCollection { confirm } => {
                if !confirm {
                    return Err(RaglineError::UnsafeDelete);
                }
                Ok(())
            }
            Self::GetStats => Ok(()),
        }
    }
}

fn check_query(query: &str, k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RaglineError::InvalidQuery(
            "Query text cannot be empty".to_string(),
        ));
    }
    if k == 0 {
        return Err(RaglineError::InvalidQuery(
            "k must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Why a tool call failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Pipeline stage that failed (`chunking`, `retrieval`, ...)
    pub stage: String,
    pub message: String,
}

/// Outcome of a dispatched tool request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolResponse {
    pub fn success(tool: &str, data: Value) -> Self {
        Self {
            tool: tool.to_string(),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(tool: &str, error: &RaglineError) -> Self {
        Self {
            tool: tool.to_string(),
            ok: false,
            data: None,
            error: Some(ToolFailure {
                stage: error.stage().to_string(),
                message: error.to_string(),
            }),
        }
    }
}
