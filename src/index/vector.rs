/// HNSW vector index for similarity search
use crate::document::ChunkId;
use crate::embedding::cosine_similarity;
use hnsw_rs::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Upper bound on HNSW layers
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector already indexed for id {0}")]
    DuplicateId(ChunkId),
}

/// Search result with ID and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Chunk id
    pub id: ChunkId,
    /// Cosine similarity score (higher is more similar)
    pub score: f32,
}

/// HNSW vector index wrapper
///
/// Keeps every vector alongside the graph: HNSW cannot remove points, so deletes
/// rebuild the graph from the retained vectors, and filtered or undersized searches
/// fall back to an exact cosine scan.
pub struct VectorIndex {
    graph: Hnsw<'static, f32, DistCosine>,
    vectors: BTreeMap<ChunkId, Vec<f32>>,
    dimension: usize,
    m: usize,
    ef_construction: usize,
    max_elements: usize,
}

impl VectorIndex {
    /// Create a new vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `m` - HNSW M parameter (number of connections per layer)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `max_elements` - Capacity hint for the graph
    pub fn new(dimension: usize, m: usize, ef_construction: usize, max_elements: usize) -> Self {
        Self {
            graph: Self::empty_graph(m, ef_construction, max_elements),
            vectors: BTreeMap::new(),
            dimension,
            m,
            ef_construction,
            max_elements,
        }
    }

    fn empty_graph(
        m: usize,
        ef_construction: usize,
        max_elements: usize,
    ) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(m, max_elements, MAX_LAYERS, ef_construction, DistCosine)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert a vector into the index
    pub fn insert(&mut self, id: ChunkId, vector: &[f32]) -> Result<(), VectorIndexError> {
        self.check_dimension(vector)?;
        if self.vectors.contains_key(&id) {
            return Err(VectorIndexError::DuplicateId(id));
        }

        self.graph.insert_slice((vector, id as usize));
        self.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    /// Remove vectors and rebuild the graph; returns how many were present
    pub fn remove(&mut self, ids: &[ChunkId]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.vectors.remove(id).is_some())
            .count();

        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    fn rebuild(&mut self) {
        self.graph = Self::empty_graph(self.m, self.ef_construction, self.max_elements);
        for (id, vector) in &self.vectors {
            self.graph.insert_slice((vector.as_slice(), *id as usize));
        }
        tracing::debug!("Rebuilt HNSW graph with {} vectors", self.vectors.len());
    }

    /// Search for k nearest neighbors
    ///
    /// Returns at least `min(k, len)` results sorted by similarity descending. When the
    /// approximate graph comes back short, the exact scan answers instead.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        let wanted = k.min(self.vectors.len());
        if wanted == 0 {
            return Ok(Vec::new());
        }

        let neighbours = self.graph.search(query, wanted, ef_search.max(wanted));

        let mut results: Vec<SearchResult> = neighbours
            .into_iter()
            .filter(|n| self.vectors.contains_key(&(n.d_id as ChunkId)))
            .map(|n| SearchResult {
                id: n.d_id as ChunkId,
                score: 1.0 - n.distance, // Convert distance to similarity
            })
            .collect();

        if results.len() < wanted {
            tracing::debug!(
                "HNSW returned {} of {} neighbours, using exact scan",
                results.len(),
                wanted
            );
            return self.search_exact(query, wanted, None);
        }

        results.truncate(wanted);
        Ok(results)
    }

    /// Exact cosine ranking, optionally restricted to an allow-list of ids
    pub fn search_exact(
        &self,
        query: &[f32],
        k: usize,
        allowed: Option<&BTreeSet<ChunkId>>,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        let mut results: Vec<SearchResult> = self
            .vectors
            .iter()
            .filter(|(id, _)| allowed.map_or(true, |set| set.contains(id)))
            .map(|(id, vector)| SearchResult {
                id: *id,
                score: cosine_similarity(query, vector),
            })
            .collect();

        // stable sort keeps id order among equal scores
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Clear the index (remove all vectors)
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.graph = Self::empty_graph(self.m, self.ef_construction, self.max_elements);
    }
}
