//! Chunk index: entry store, BM25 keyword index and HNSW vector index kept in step
//!
//! Layout of a persisted index directory:
//! - `entries.sqlite`: chunks, metadata, embeddings and the id counter
//! - `keywords/`: tantivy index
//!
//! The HNSW graph is not written to disk; it is rebuilt from the stored embeddings on open.

mod keyword;
mod store;
mod vector;

pub use keyword::{KeywordIndex, KeywordIndexError, KeywordSearchResult};
pub use store::{content_hash, EntryStore, StoredEntry};
pub use vector::{SearchResult, VectorIndex, VectorIndexError};

use crate::config::Config;
use crate::document::{metadata_matches, Chunk, ChunkId, Metadata};
use crate::embedding::{BatchEmbedder, EmbeddingProvider};
use crate::error::{RaglineError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const META_DIMENSION: &str = "dimension";
const META_MODEL: &str = "model";

/// Tuning knobs for a `KnowledgeIndex`
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub max_elements: usize,
    /// Texts per embedding provider call
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            max_elements: 100_000,
            batch_size: 32,
        }
    }
}

impl From<&Config> for IndexOptions {
    fn from(config: &Config) -> Self {
        Self {
            hnsw_m: config.indexing.hnsw_m,
            hnsw_ef_construction: config.indexing.hnsw_ef_construction,
            max_elements: config.indexing.max_elements,
            batch_size: config.embedding.batch_size,
        }
    }
}

/// Collection statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_chars: usize,
    pub avg_chars: f64,
    pub min_chars: usize,
    pub max_chars: usize,
    /// Chunks with distinct content (BLAKE3 content hash)
    pub distinct_contents: usize,
    pub sources: BTreeMap<String, usize>,
    pub extensions: BTreeMap<String, usize>,
    pub dimension: usize,
    pub model: String,
    pub directory: Option<PathBuf>,
    pub initialized: bool,
}

/// The searchable collection of chunks
pub struct KnowledgeIndex {
    embedder: BatchEmbedder,
    store: EntryStore,
    keywords: KeywordIndex,
    vectors: VectorIndex,
    entries: BTreeMap<ChunkId, Chunk>,
    next_id: ChunkId,
    initialized: bool,
    directory: Option<PathBuf>,
}

impl KnowledgeIndex {
    /// A transient index; searching it fails until the first `add`
    pub fn in_memory(provider: Arc<dyn EmbeddingProvider>, options: IndexOptions) -> Result<Self> {
        let vectors = VectorIndex::new(
            provider.dimension(),
            options.hnsw_m,
            options.hnsw_ef_construction,
            options.max_elements,
        );

        Ok(Self {
            embedder: BatchEmbedder::new(provider, options.batch_size),
            store: EntryStore::in_memory()?,
            keywords: KeywordIndex::in_memory()?,
            vectors,
            entries: BTreeMap::new(),
            next_id: 1,
            initialized: false,
            directory: None,
        })
    }

    /// Open (or create) a persisted index in `directory`
    ///
    /// A reopened index counts as initialized once anything was ever added to it, even if
    /// it has since been emptied.
    pub fn open(
        directory: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Result<Self> {
        std::fs::create_dir_all(directory).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to create index directory: {}", directory.display()),
        })?;

        let store = EntryStore::open(&directory.join("entries.sqlite"))?;

        let dimension = provider.dimension();
        let stored_dimension = store.get_meta(META_DIMENSION)?;
        let initialized = stored_dimension.is_some();
        if let Some(stored) = stored_dimension {
            let stored: usize = stored.parse().map_err(|_| {
                RaglineError::Config(format!("Corrupt dimension in entry store: {}", stored))
            })?;
            if stored != dimension {
                return Err(RaglineError::DimensionMismatch {
                    expected: stored,
                    actual: dimension,
                });
            }
        }
        if let Some(model) = store.get_meta(META_MODEL)? {
            if model != provider.model_name() {
                warn!(
                    "Index was built with model '{}' but '{}' is configured; results may degrade",
                    model,
                    provider.model_name()
                );
            }
        }

        let mut keywords = KeywordIndex::open(&directory.join("keywords"))?;
        let mut vectors = VectorIndex::new(
            dimension,
            options.hnsw_m,
            options.hnsw_ef_construction,
            options.max_elements,
        );

        let stored = store.load_all()?;
        let mut entries = BTreeMap::new();
        for entry in stored {
            let id = entry.id();
            vectors.insert(id, &entry.embedding)?;
            entries.insert(id, entry.chunk);
        }

        // An interrupted delete can leave tantivy ahead of or behind the store
        if keywords.len() != entries.len() as u64 {
            warn!(
                "Keyword index holds {} documents but store holds {}; rebuilding",
                keywords.len(),
                entries.len()
            );
            keywords.clear()?;
            for (id, chunk) in &entries {
                keywords.insert(*id, &chunk.content)?;
            }
            keywords.commit()?;
        }

        let next_id = store.next_id()?;
        info!(
            "Opened index at {} ({} chunks)",
            directory.display(),
            entries.len()
        );

        Ok(Self {
            embedder: BatchEmbedder::new(provider, options.batch_size),
            store,
            keywords,
            vectors,
            entries,
            next_id,
            initialized,
            directory: Some(directory.to_path_buf()),
        })
    }

    /// Open the index the configuration describes
    pub fn from_config(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let options = IndexOptions::from(config);
        if config.storage.persist {
            Self::open(&config.index_dir()?, provider, options)
        } else {
            Self::in_memory(provider, options)
        }
    }

    /// Embed and insert chunks, returning their ids in input order
    ///
    /// Nothing is committed unless every chunk is embedded and stored.
    pub fn add(&mut self, chunks: Vec<Chunk>) -> Result<Vec<ChunkId>> {
        if chunks.is_empty() {
            self.initialized = true;
            return Ok(Vec::new());
        }

        if chunks.iter().any(|c| c.content.is_empty()) {
            return Err(RaglineError::EmptyInput);
        }

        let ids = self.assign_ids(&chunks)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_all(&texts)?.embeddings;

        let dimension = self.vectors.dimension();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(RaglineError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let entries: Vec<StoredEntry> = chunks
            .into_iter()
            .zip(ids.iter())
            .zip(embeddings)
            .map(|((mut chunk, id), embedding)| {
                chunk.id = Some(*id);
                StoredEntry {
                    content_hash: content_hash(&chunk.content),
                    chunk,
                    embedding,
                }
            })
            .collect();

        let next_id = ids
            .iter()
            .copied()
            .max()
            .map_or(self.next_id, |max| max.saturating_add(1).max(self.next_id));

        self.persist_entries(&entries, next_id)?;

        for entry in &entries {
            self.vectors.insert(entry.id(), &entry.embedding)?;
        }
        for entry in entries {
            self.entries.insert(entry.id(), entry.chunk);
        }

        self.next_id = next_id;
        self.initialized = true;
        info!("Indexed {} chunks ({} total)", ids.len(), self.entries.len());

        Ok(ids)
    }

    /// Give every chunk an id, rejecting collisions among pre-assigned ones
    fn assign_ids(&self, chunks: &[Chunk]) -> Result<Vec<ChunkId>> {
        let mut taken = HashSet::new();
        for id in chunks.iter().filter_map(|c| c.id) {
            if self.entries.contains_key(&id) || !taken.insert(id) {
                return Err(RaglineError::DuplicateId { id });
            }
        }

        let mut next = self.next_id;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk.id {
                Some(id) => ids.push(id),
                None => {
                    while taken.contains(&next) || self.entries.contains_key(&next) {
                        next += 1;
                    }
                    ids.push(next);
                    taken.insert(next);
                    next += 1;
                }
            }
        }
        Ok(ids)
    }

    /// Stage keywords, write the store transaction, then commit keywords
    fn persist_entries(&mut self, entries: &[StoredEntry], next_id: ChunkId) -> Result<()> {
        for entry in entries {
            if let Err(e) = self.keywords.insert(entry.id(), &entry.chunk.content) {
                self.keywords.rollback()?;
                return Err(e.into());
            }
        }

        if let Err(e) = self.store.insert_entries(entries, next_id) {
            self.keywords.rollback()?;
            return Err(e);
        }

        if let Err(e) = self.keywords.commit() {
            let ids: Vec<ChunkId> = entries.iter().map(StoredEntry::id).collect();
            self.store.delete_ids(&ids)?;
            self.keywords.rollback()?;
            return Err(e.into());
        }

        self.store
            .set_meta(META_DIMENSION, &self.vectors.dimension().to_string())?;
        self.store
            .set_meta(META_MODEL, self.embedder.provider().model_name())?;
        Ok(())
    }

    /// Remove entries whose metadata matches every filter pair
    ///
    /// An empty filter selects everything and therefore requires `confirm`.
    pub fn delete(&mut self, filter: &Metadata, confirm: bool) -> Result<usize> {
        if filter.is_empty() {
            if !confirm {
                return Err(RaglineError::UnsafeDelete);
            }
            return self.clear(true);
        }

        let ids: Vec<ChunkId> = self.matching_ids(Some(filter)).into_iter().collect();
        if ids.is_empty() {
            debug!("Delete filter matched nothing");
            return Ok(0);
        }

        self.remove_ids(&ids)
    }

    /// Delete specific chunks by id; unknown ids are ignored
    pub fn delete_ids(&mut self, ids: &[ChunkId]) -> Result<usize> {
        let present: Vec<ChunkId> = ids
            .iter()
            .copied()
            .filter(|id| self.entries.contains_key(id))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        self.remove_ids(&present)
    }

    fn remove_ids(&mut self, ids: &[ChunkId]) -> Result<usize> {
        let removed = self.store.delete_ids(ids)?;

        for id in ids {
            self.keywords.delete(*id);
        }
        self.keywords.commit()?;

        self.vectors.remove(ids);
        for id in ids {
            self.entries.remove(id);
        }

        info!("Deleted {} chunks ({} remain)", removed, self.entries.len());
        Ok(removed)
    }

    /// Wipe the collection; ids already handed out are not reused
    pub fn clear(&mut self, confirm: bool) -> Result<usize> {
        if !confirm {
            return Err(RaglineError::UnsafeDelete);
        }

        let removed = self.store.clear()?;
        self.keywords.clear()?;
        self.vectors.clear();
        self.entries.clear();
        self.initialized = true;

        info!("Cleared index ({} chunks removed)", removed);
        Ok(removed)
    }

    /// Chunks in id order, optionally filtered and limited
    pub fn list(&self, limit: Option<usize>, filter: Option<&Metadata>) -> Vec<Chunk> {
        self.entries
            .values()
            .filter(|c| filter.map_or(true, |f| metadata_matches(&c.metadata, f)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Ids whose metadata matches `filter` (all ids when `None`)
    pub fn matching_ids(&self, filter: Option<&Metadata>) -> BTreeSet<ChunkId> {
        self.entries
            .iter()
            .filter(|(_, c)| filter.map_or(true, |f| metadata_matches(&c.metadata, f)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.entries.get(&id)
    }

    /// Embed a query with the index's own provider
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.provider().embed(query)?;
        if vector.len() != self.vectors.dimension() {
            return Err(RaglineError::DimensionMismatch {
                expected: self.vectors.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn keywords(&self) -> &KeywordIndex {
        &self.keywords
    }

    /// True once something has been added, here or in an earlier run on the same directory
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.provider().model_name()
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Collection statistics
    pub fn stats(&self) -> IndexStats {
        let lengths: Vec<usize> = self
            .entries
            .values()
            .map(|c| c.content.chars().count())
            .collect();
        let total_chars: usize = lengths.iter().sum();

        let distinct_contents = self
            .entries
            .values()
            .map(|c| content_hash(&c.content))
            .collect::<HashSet<_>>()
            .len();

        let mut sources = BTreeMap::new();
        let mut extensions = BTreeMap::new();
        for chunk in self.entries.values() {
            let source = chunk.meta_str("source").unwrap_or("unknown");
            *sources.entry(source.to_string()).or_insert(0) += 1;

            let extension = chunk
                .meta_str("file_extension")
                .map(str::to_string)
                .or_else(|| {
                    chunk
                        .meta_str("source")
                        .and_then(|s| Path::new(s).extension())
                        .map(|e| format!(".{}", e.to_string_lossy()))
                })
                .unwrap_or_else(|| "none".to_string());
            *extensions.entry(extension).or_insert(0) += 1;
        }

        IndexStats {
            total_chunks: lengths.len(),
            total_chars,
            avg_chars: if lengths.is_empty() {
                0.0
            } else {
                total_chars as f64 / lengths.len() as f64
            },
            min_chars: lengths.iter().copied().min().unwrap_or(0),
            max_chars: lengths.iter().copied().max().unwrap_or(0),
            distinct_contents,
            sources,
            extensions,
            dimension: self.dimension(),
            model: self.model_name().to_string(),
            directory: self.directory.clone(),
            initialized: self.initialized,
        }
    }
}
