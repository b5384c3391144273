//! LLM query expansion
//!
//! The model is asked for three reformulations, one per labelled line
//! (`Specific: ...`, `Expanded: ...`, `Structured: ...`). Any `Label: text` line is
//! accepted so that models which translate or renumber the labels still parse.

use crate::generation::{GenerationError, GenerationParams, GenerationProvider};
use crate::retrieval::deduplicate_queries;
use regex::Regex;
use thiserror::Error;

/// Upper bound on query variants, original included
pub const MAX_QUERY_VARIANTS: usize = 4;

#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("Expansion request failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Expansion response contained no usable variants")]
    NoVariants,

    #[error("Invalid variant pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct QueryExpander {
    line_pattern: Regex,
    max_variants: usize,
}

impl QueryExpander {
    pub fn new(max_variants: usize) -> Result<Self, ExpansionError> {
        // optional list marker, a short label, an ASCII or full-width colon, the variant
        let line_pattern =
            Regex::new(r"^\s*(?:[-*]\s*|\d+[.)]\s*)?[^:：]{1,40}[:：]\s*(.+?)\s*$")?;

        Ok(Self {
            line_pattern,
            max_variants: max_variants.clamp(1, MAX_QUERY_VARIANTS),
        })
    }

    pub fn prompt(&self, query: &str) -> String {
        format!(
            "You are a search query optimization expert. Rewrite the user query into more \
effective search queries.\n\n\
Original query: {query}\n\n\
Produce 3 optimized versions:\n\
1. A specific query that adds relevant technical terms\n\
2. An expanded query using synonyms and related concepts\n\
3. A structured query that breaks the question into sub-questions\n\n\
Output format:\n\
Specific: [query 1]\n\
Expanded: [query 2]\n\
Structured: [query 3]"
        )
    }

    /// Parse labelled lines into variants, original query first
    pub fn parse(&self, query: &str, response: &str) -> Vec<String> {
        let mut variants = vec![query.trim().to_string()];

        for line in response.lines() {
            if let Some(caps) = self.line_pattern.captures(line) {
                let text = caps[1]
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .trim();
                if !text.is_empty() {
                    variants.push(text.to_string());
                }
            }
        }

        let mut variants = deduplicate_queries(variants);
        variants.truncate(self.max_variants);
        variants
    }

    /// Ask the provider for variants
    ///
    /// Errors are returned, never swallowed; callers decide how to fall back.
    pub async fn expand(
        &self,
        provider: &dyn GenerationProvider,
        query: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, ExpansionError> {
        let response = provider.generate(&self.prompt(query), params).await?;
        let variants = self.parse(query, &response);

        if variants.len() <= 1 {
            return Err(ExpansionError::NoVariants);
        }

        tracing::debug!("Expanded query into {} variants", variants.len());
        Ok(variants)
    }
}
