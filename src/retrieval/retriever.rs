//! Semantic, lexical and hybrid search over a `KnowledgeIndex`

use crate::config::RetrievalConfig;
use crate::document::{ChunkId, Metadata};
use crate::error::{RaglineError, Result};
use crate::generation::{GenerationParams, GenerationProvider};
use crate::index::KnowledgeIndex;
use crate::retrieval::{
    aggregate_by_frequency, deduplicate_results, reciprocal_rank_fusion, FusionConfig,
    QueryExpander, RetrievalResult, SearchMethod, SearchRequest,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Stateless search strategy; the index is passed per call so callers control locking
pub struct Retriever {
    config: RetrievalConfig,
    fusion: FusionConfig,
    expander: QueryExpander,
}

impl Retriever {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let fusion = FusionConfig::from_config(&config)
            .map_err(|e| RaglineError::Config(e.to_string()))?;
        let expander = QueryExpander::new(config.max_query_variants)
            .map_err(|e| RaglineError::Config(e.to_string()))?;

        Ok(Self {
            config,
            fusion,
            expander,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Query variants for a request: just the query unless expansion was asked for
    ///
    /// Expansion failures (or no generator) fall back to the original query.
    pub async fn expand_queries(
        &self,
        request: &SearchRequest,
        generator: Option<&dyn GenerationProvider>,
        params: &GenerationParams,
    ) -> Vec<String> {
        let original = vec![request.query.trim().to_string()];
        if !request.expand {
            return original;
        }

        let Some(generator) = generator else {
            warn!("Query expansion requested but no generation provider is configured");
            return original;
        };

        match self.expander.expand(generator, &request.query, params).await {
            Ok(variants) => variants,
            Err(e) => {
                warn!("Query expansion failed, using original query: {}", e);
                original
            }
        }
    }

    /// Run a request against the index for every query variant
    ///
    /// One variant: the method's own ranking. Several: results are ranked by how many
    /// variants retrieved them.
    pub fn search_variants(
        &self,
        index: &KnowledgeIndex,
        request: &SearchRequest,
        queries: &[String],
    ) -> Result<Vec<RetrievalResult>> {
        Self::validate(request)?;

        if queries.len() <= 1 {
            return self.search(index, request);
        }

        let mut sets = Vec::with_capacity(queries.len());
        for query in queries {
            let variant = SearchRequest {
                query: query.clone(),
                expand: false,
                ..request.clone()
            };
            sets.push(self.search(index, &variant)?);
        }

        let mut fused = aggregate_by_frequency(sets);
        for result in &mut fused {
            result.method = request.method;
        }
        fused.truncate(request.k);

        debug!(
            "Fused {} query variants into {} results",
            queries.len(),
            fused.len()
        );
        Ok(fused)
    }

    /// Single-query search with the request's method
    pub fn search(
        &self,
        index: &KnowledgeIndex,
        request: &SearchRequest,
    ) -> Result<Vec<RetrievalResult>> {
        Self::validate(request)?;

        if !index.initialized() {
            return Err(RaglineError::IndexNotInitialized);
        }
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let filter = request.filter.as_ref().filter(|f| !f.is_empty());
        let query = request.query.trim();
        // never ask the graph or BM25 collector for more than the collection holds
        let k = request.k.min(index.len());

        let results = match request.method {
            SearchMethod::Semantic => self.semantic(index, query, k, filter)?,
            SearchMethod::Lexical => self.lexical(index, query, k, filter)?,
            SearchMethod::Hybrid => self.hybrid(index, query, k, filter)?,
        };

        debug!(
            "{} search for '{}' returned {} results",
            request.method,
            query,
            results.len()
        );
        Ok(results)
    }

    /// Reject empty queries and `k == 0` before any work is done
    pub fn validate(request: &SearchRequest) -> Result<()> {
        if request.query.trim().is_empty() {
            return Err(RaglineError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if request.k == 0 {
            return Err(RaglineError::InvalidQuery(
                "k must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Cosine similarity search; filtered requests use an exact scan over the allowed ids
    pub fn semantic(
        &self,
        index: &KnowledgeIndex,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<RetrievalResult>> {
        let allowed = filter.map(|f| index.matching_ids(Some(f)));
        if allowed.as_ref().is_some_and(|set| set.is_empty()) {
            return Ok(Vec::new());
        }

        let query_vector = index.embed_query(query)?;
        let hits = match &allowed {
            Some(set) => index.vectors().search_exact(&query_vector, k, Some(set))?,
            None => index
                .vectors()
                .search(&query_vector, k, self.config.hnsw_ef_search)?,
        };

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                index.get(hit.id).map(|chunk| {
                    RetrievalResult::new(chunk.clone(), hit.score, SearchMethod::Semantic)
                })
            })
            .collect())
    }

    /// BM25 search, topped up with zero-score candidates in id order
    pub fn lexical(
        &self,
        index: &KnowledgeIndex,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<RetrievalResult>> {
        let candidates = index.matching_ids(filter);
        let wanted = k.min(candidates.len());

        // a filter can reject any number of BM25 hits, so rank the whole collection
        let limit = if filter.is_some() {
            index.len()
        } else {
            k.min(index.len())
        };
        let hits = index.keywords().search(query, limit)?;

        let mut seen: HashSet<ChunkId> = HashSet::new();
        let mut results = Vec::with_capacity(wanted);

        for hit in hits {
            if results.len() == wanted {
                break;
            }
            if !candidates.contains(&hit.id) || !seen.insert(hit.id) {
                continue;
            }
            if let Some(chunk) = index.get(hit.id) {
                results.push(RetrievalResult::new(
                    chunk.clone(),
                    hit.score,
                    SearchMethod::Lexical,
                ));
            }
        }

        for id in &candidates {
            if results.len() == wanted {
                break;
            }
            if seen.insert(*id) {
                if let Some(chunk) = index.get(*id) {
                    results.push(RetrievalResult::new(
                        chunk.clone(),
                        0.0,
                        SearchMethod::Lexical,
                    ));
                }
            }
        }

        Ok(results)
    }

    /// Weighted reciprocal-rank fusion of semantic and lexical rankings
    pub fn hybrid(
        &self,
        index: &KnowledgeIndex,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<RetrievalResult>> {
        let fetch = k
            .saturating_mul(self.config.search_multiplier.max(1))
            .min(index.len());

        let semantic = self.semantic(index, query, fetch, filter)?;
        let lexical = self.lexical(index, query, fetch, filter)?;

        let semantic_ids: Vec<ChunkId> = semantic.iter().filter_map(|r| r.chunk.id).collect();
        let lexical_ids: Vec<ChunkId> = lexical.iter().filter_map(|r| r.chunk.id).collect();

        let fused = reciprocal_rank_fusion(&semantic_ids, &lexical_ids, &self.fusion);

        let results = fused
            .into_iter()
            .filter_map(|(id, score)| {
                index.get(id).map(|chunk| {
                    RetrievalResult::new(chunk.clone(), score, SearchMethod::Hybrid)
                })
            })
            .take(k)
            .collect();

        Ok(deduplicate_results(results))
    }
}
