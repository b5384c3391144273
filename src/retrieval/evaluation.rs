//! Source-level retrieval evaluation
//!
//! For every method, each test case's retrieved sources are compared with the expected
//! ones; precision and recall are averaged over cases and F1 is taken from the averages.

use crate::error::Result;
use crate::index::KnowledgeIndex;
use crate::retrieval::{Retriever, SearchMethod, SearchRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One labelled query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub expected_sources: Vec<String>,
}

/// Averaged metrics for one search method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodMetrics {
    pub method: SearchMethod,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Evaluate every search method at depth `k`
pub fn evaluate(
    retriever: &Retriever,
    index: &KnowledgeIndex,
    cases: &[EvalCase],
    k: usize,
) -> Result<Vec<MethodMetrics>> {
    let mut metrics = Vec::with_capacity(SearchMethod::ALL.len());

    for method in SearchMethod::ALL {
        let mut precisions = Vec::new();
        let mut recalls = Vec::new();

        for case in cases {
            let expected: HashSet<&str> =
                case.expected_sources.iter().map(String::as_str).collect();
            let request = SearchRequest::new(case.query.clone(), k).with_method(method);
            let results = retriever.search(index, &request)?;

            let retrieved: HashSet<&str> = results
                .iter()
                .map(|r| r.chunk.meta_str("source").unwrap_or(""))
                .collect();
            let hits = expected.intersection(&retrieved).count() as f32;

            // cases with nothing retrieved or nothing expected do not count toward that average
            if !retrieved.is_empty() {
                precisions.push(hits / retrieved.len() as f32);
            }
            if !expected.is_empty() {
                recalls.push(hits / expected.len() as f32);
            }
        }

        let precision = mean(&precisions);
        let recall = mean(&recalls);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        tracing::info!(
            "{} - P: {:.3}, R: {:.3}, F1: {:.3}",
            method,
            precision,
            recall,
            f1
        );

        metrics.push(MethodMetrics {
            method,
            precision,
            recall,
            f1,
        });
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::document::{Chunk, Metadata};
    use crate::embedding::HashingEmbedProvider;
    use crate::index::IndexOptions;
    use serde_json::json;
    use std::sync::Arc;

    fn chunk(content: &str, source: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!(source));
        Chunk::new(content, metadata)
    }

    #[test]
    fn test_perfect_single_source() {
        let mut index = KnowledgeIndex::in_memory(
            Arc::new(HashingEmbedProvider::new(128).unwrap()),
            IndexOptions::default(),
        )
        .unwrap();
        index
            .add(vec![
                chunk("vector databases store embeddings", "vectors.md"),
                chunk("bm25 ranks documents by term frequency", "bm25.md"),
            ])
            .unwrap();

        let retriever = Retriever::new(RetrievalConfig::default()).unwrap();
        let cases = vec![EvalCase {
            query: "embeddings vector databases".to_string(),
            expected_sources: vec!["vectors.md".to_string()],
        }];

        let metrics = evaluate(&retriever, &index, &cases, 1).unwrap();
        assert_eq!(metrics.len(), 3);
        for m in &metrics {
            assert_eq!(m.precision, 1.0, "{}", m.method);
            assert_eq!(m.recall, 1.0, "{}", m.method);
            assert_eq!(m.f1, 1.0, "{}", m.method);
        }
    }

    #[test]
    fn test_mean_of_nothing() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[0.5, 1.0]) - 0.75).abs() < 1e-6);
    }
}
