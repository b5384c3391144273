//! Rank fusion: weighted Reciprocal Rank Fusion and frequency aggregation

use crate::config::RetrievalConfig;
use crate::document::ChunkId;
use crate::retrieval::RetrievalResult;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,

    #[error("Invalid RRF constant: must be positive")]
    InvalidRrfK,
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for semantic results
    pub semantic_weight: f32,

    /// Weight for keyword results
    pub keyword_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, semantic_weight: f32, keyword_weight: f32) -> Result<Self, FusionError> {
        if semantic_weight <= 0.0 || keyword_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }
        if rrf_k <= 0.0 {
            return Err(FusionError::InvalidRrfK);
        }

        Ok(Self {
            rrf_k,
            semantic_weight,
            keyword_weight,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self, FusionError> {
        Self::new(config.rrf_k, config.semantic_weight, config.keyword_weight)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
        }
    }
}

/// Accumulates scores per id while remembering first-seen order
#[derive(Default)]
struct Tally {
    order: Vec<ChunkId>,
    scores: HashMap<ChunkId, f32>,
}

impl Tally {
    fn add(&mut self, id: ChunkId, score: f32) {
        match self.scores.get_mut(&id) {
            Some(total) => *total += score,
            None => {
                self.order.push(id);
                self.scores.insert(id, score);
            }
        }
    }

    /// Sorted by score descending; the stable sort leaves ties in first-seen order
    fn into_ranked(self) -> Vec<(ChunkId, f32)> {
        let scores = self.scores;
        let mut ranked: Vec<(ChunkId, f32)> = self
            .order
            .into_iter()
            .map(|id| (id, scores.get(&id).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Apply weighted Reciprocal Rank Fusion to semantic and keyword rankings
///
/// RRF formula: score(id) = sum over rankings of: weight / (k + rank + 1), rank 0-based.
/// Ids are visited semantic-first, so semantic order wins ties.
///
/// # Returns
/// Fused results as (id, fused_score) pairs, sorted by score descending
pub fn reciprocal_rank_fusion(
    semantic_results: &[ChunkId],
    keyword_results: &[ChunkId],
    config: &FusionConfig,
) -> Vec<(ChunkId, f32)> {
    let mut tally = Tally::default();

    for (rank, id) in semantic_results.iter().enumerate() {
        tally.add(*id, config.semantic_weight / (config.rrf_k + rank as f32 + 1.0));
    }

    for (rank, id) in keyword_results.iter().enumerate() {
        tally.add(*id, config.keyword_weight / (config.rrf_k + rank as f32 + 1.0));
    }

    tally.into_ranked()
}

/// Rank chunks by how many result sets contain them
///
/// Used when several query variants were searched: score = appearance count, ties
/// broken by first appearance across the sets in order.
pub fn aggregate_by_frequency(result_sets: Vec<Vec<RetrievalResult>>) -> Vec<RetrievalResult> {
    let mut tally = Tally::default();
    let mut firsts: HashMap<ChunkId, RetrievalResult> = HashMap::new();
    let mut anonymous = Vec::new();

    for set in result_sets {
        for result in set {
            match result.chunk.id {
                Some(id) => {
                    tally.add(id, 1.0);
                    firsts.entry(id).or_insert(result);
                }
                None => anonymous.push(result),
            }
        }
    }

    let mut fused: Vec<RetrievalResult> = tally
        .into_ranked()
        .into_iter()
        .filter_map(|(id, count)| {
            firsts.remove(&id).map(|mut result| {
                result.score = count;
                result
            })
        })
        .collect();

    // chunks without ids cannot be matched across sets
    fused.extend(anonymous.into_iter().map(|mut r| {
        r.score = 1.0;
        r
    }));
    fused
}
