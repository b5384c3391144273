//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ragline::config::Config;
use ragline::document::Document;
use ragline::embedding::{EmbeddingProvider, HashingEmbedProvider};
use ragline::generation::{GenerationError, GenerationParams, GenerationProvider};
use ragline::index::{IndexOptions, KnowledgeIndex};
use ragline::pipeline::RagPipeline;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Generation stand-in: answers from a queue of replies (repeating the last) and records prompts
pub struct ScriptedGenerator {
    replies: Mutex<Vec<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Arc<Self> {
        Self::with_replies(vec![Ok(reply.to_string())])
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::with_replies(vec![Err(message.to_string())])
    }

    pub fn with_replies(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies
                .first()
                .cloned()
                .unwrap_or_else(|| Err("no scripted reply".to_string()))
        };
        reply.map_err(GenerationError::Http)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn hashing_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbedProvider::new(256).unwrap())
}

/// Offline configuration: hashing embeddings, no generation endpoint
pub fn offline_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.apply_profile("offline").unwrap();
    config.embedding.dimension = 256;
    config.storage.data_dir = data_dir.to_path_buf();
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config
}

/// In-memory pipeline with an optional scripted generator
pub fn pipeline(generator: Option<Arc<ScriptedGenerator>>) -> RagPipeline {
    pipeline_in(Path::new("/nonexistent"), generator)
}

/// In-memory index, but sessions land under `data_dir`
pub fn pipeline_in(data_dir: &Path, generator: Option<Arc<ScriptedGenerator>>) -> RagPipeline {
    let config = offline_config(data_dir);
    let index = KnowledgeIndex::in_memory(hashing_provider(), IndexOptions::from(&config)).unwrap();
    let generator = generator.map(|g| g as Arc<dyn GenerationProvider>);
    RagPipeline::new(config, index, generator).unwrap()
}

pub fn sample_documents() -> Vec<Document> {
    vec![
        Document::new(
            "Rust enforces memory safety through ownership. Every value has a single owner, \
             and borrowing lets code use a value without taking ownership of it.",
        )
        .with_meta("source", "rust.md")
        .with_meta("topic", "rust"),
        Document::new(
            "Tokio is an asynchronous runtime for Rust. It schedules futures on a pool of \
             worker threads and provides async networking primitives.",
        )
        .with_meta("source", "tokio.md")
        .with_meta("topic", "rust"),
        Document::new(
            "Sourdough bread rises with a wild yeast starter. Feed the starter with flour and \
             water the day before baking.",
        )
        .with_meta("source", "bread.md")
        .with_meta("topic", "cooking"),
        Document::new(
            "Vector databases store embeddings and answer nearest neighbour queries. HNSW \
             graphs make approximate search fast.",
        )
        .with_meta("source", "vectors.md")
        .with_meta("topic", "search"),
    ]
}
