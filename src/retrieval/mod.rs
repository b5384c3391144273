//! Retrieval: semantic, lexical and hybrid search with optional query expansion
//!
//! Single-query hybrid search fuses the semantic and BM25 rankings with weighted
//! Reciprocal Rank Fusion. Expanded queries are searched one by one and the result
//! sets are ranked by how often each chunk was retrieved.

mod deduplication;
mod evaluation;
mod expansion;
mod fusion;
mod provenance;
mod retriever;

pub use deduplication::{deduplicate_queries, deduplicate_results};
pub use evaluation::{evaluate, EvalCase, MethodMetrics};
pub use expansion::{ExpansionError, QueryExpander, MAX_QUERY_VARIANTS};
pub use fusion::{aggregate_by_frequency, reciprocal_rank_fusion, FusionConfig, FusionError};
pub use provenance::{source_label, RetrievalResult};
pub use retriever::Retriever;

use crate::document::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How candidates are ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Embedding cosine similarity
    Semantic,
    /// BM25 keyword ranking
    #[serde(alias = "bm25", alias = "keyword")]
    Lexical,
    /// Both, fused
    Hybrid,
}

impl SearchMethod {
    pub const ALL: [SearchMethod; 3] = [Self::Semantic, Self::Lexical, Self::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "semantic" | "vector" => Ok(Self::Semantic),
            "lexical" | "bm25" | "keyword" => Ok(Self::Lexical),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "Unknown search method '{}' (expected semantic, lexical/bm25 or hybrid)",
                other
            )),
        }
    }
}

/// Search query with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Maximum number of results
    pub k: usize,

    pub method: SearchMethod,

    /// Exact-match metadata filter; every pair must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Metadata>,

    /// Ask the generation provider for query variants first
    #[serde(default)]
    pub expand: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            method: SearchMethod::Hybrid,
            filter: None,
            expand: false,
        }
    }

    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_filter(mut self, filter: Metadata) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_expansion(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_aliases() {
        assert_eq!("bm25".parse::<SearchMethod>().unwrap(), SearchMethod::Lexical);
        assert_eq!("Hybrid".parse::<SearchMethod>().unwrap(), SearchMethod::Hybrid);
        assert!("fuzzy".parse::<SearchMethod>().is_err());

        let method: SearchMethod = serde_json::from_str("\"keyword\"").unwrap();
        assert_eq!(method, SearchMethod::Lexical);
        assert_eq!(serde_json::to_string(&method).unwrap(), "\"lexical\"");
    }
}
