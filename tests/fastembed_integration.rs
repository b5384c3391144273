//! Semantic retrieval with a real ONNX embedding model

mod common;

use common::sample_documents;
use ragline::config::Config;
use ragline::embedding::{EmbeddingProvider, FastEmbedProvider};
use ragline::index::{IndexOptions, KnowledgeIndex};
use ragline::pipeline::RagPipeline;
use ragline::retrieval::{SearchMethod, SearchRequest};
use std::sync::Arc;

#[tokio::test]
#[ignore] // Requires model download
async fn test_semantic_search_with_minilm() {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        FastEmbedProvider::with_default_model().expect("Failed to initialize embedding provider"),
    );
    assert_eq!(provider.dimension(), 384);

    let config = Config::default();
    let index = KnowledgeIndex::in_memory(provider, IndexOptions::from(&config)).unwrap();
    let pipeline = RagPipeline::new(config, index, None).unwrap();
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    // no shared words with the bread document, only shared meaning
    let request =
        SearchRequest::new("how do I make a loaf at home", 1).with_method(SearchMethod::Semantic);
    let results = pipeline.search(&request).await.unwrap();

    assert_eq!(results[0].chunk.meta_str("source"), Some("bread.md"));
    assert!(results[0].score > 0.2);
}
