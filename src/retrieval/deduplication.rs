//! Result deduplication by chunk ID

use crate::retrieval::RetrievalResult;
use std::collections::HashSet;

/// Deduplicate results by chunk id, keeping the first (highest-ranked) instance
pub fn deduplicate_results(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();

    results
        .into_iter()
        .filter(|result| seen.insert(result.chunk.id))
        .collect()
}

/// Remove repeated query strings (case- and whitespace-insensitive), keeping order
pub fn deduplicate_queries(queries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();

    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, Metadata};
    use crate::retrieval::SearchMethod;

    fn result(id: u64, score: f32) -> RetrievalResult {
        let mut chunk = Chunk::new(format!("text{}", id), Metadata::new());
        chunk.id = Some(id);
        RetrievalResult::new(chunk, score, SearchMethod::Semantic)
    }

    #[test]
    fn test_deduplication() {
        let deduped = deduplicate_results(vec![result(1, 0.9), result(2, 0.8), result(1, 0.7)]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].chunk.id, Some(1));
        assert_eq!(deduped[0].score, 0.9);
    }

    #[test]
    fn test_query_deduplication() {
        let queries = vec![
            "What is RAG?".to_string(),
            "  what is rag?  ".to_string(),
            String::new(),
            "retrieval augmented generation".to_string(),
        ];

        assert_eq!(
            deduplicate_queries(queries),
            vec!["What is RAG?", "retrieval augmented generation"]
        );
    }
}
