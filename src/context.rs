//! Prompt context assembly

use crate::retrieval::RetrievalResult;
use std::collections::HashSet;

/// Returned in place of a context when nothing was retrieved
pub const NO_DOCUMENTS_SENTINEL: &str = "No relevant documents found.";

/// Format ranked results as labelled blocks separated by blank lines
///
/// Each block is `[Document {i}: {label}]` followed by the trimmed chunk content.
/// Content is never truncated.
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_DOCUMENTS_SENTINEL.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let position = i + 1;
            format!(
                "[Document {}: {}]\n{}",
                position,
                result.label(position),
                result.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Source labels in rank order, each listed once
pub fn source_labels(results: &[RetrievalResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .enumerate()
        .map(|(i, result)| result.label(i + 1))
        .filter(|label| seen.insert(label.clone()))
        .collect()
}
