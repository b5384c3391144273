//! The RAG pipeline: chunk, index, retrieve and answer behind one handle
//!
//! The index sits behind a `tokio::sync::RwLock`. Writes (`ingest*`, `delete`, `clear`)
//! are serialized; searches share read access. Query expansion runs before the read
//! lock is taken so no lock is held across a network call.

use crate::chunking::TextSplitter;
use crate::config::Config;
use crate::document::{Chunk, ChunkId, Document, Metadata};
use crate::embedding::provider_from_config;
use crate::error::{RaglineError, Result};
use crate::generation::{
    AnswerResult, AnswerStyle, Answerer, GenerationError, GenerationParams, GenerationProvider,
    OpenAiCompatibleProvider, SummaryKind,
};
use crate::index::{IndexStats, KnowledgeIndex};
use crate::retrieval::{
    evaluate, EvalCase, MethodMetrics, RetrievalResult, Retriever, SearchMethod, SearchRequest,
};
use crate::session::{ChatSession, SessionManager};
use crate::tools::{ChunkOverride, ToolRequest, ToolResponse};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Outcome of an ingestion call
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub ids: Vec<ChunkId>,
    pub avg_chunk_chars: usize,
    pub duration_ms: u64,
}

/// Options for [`RagPipeline::ask`]
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub k: usize,
    pub method: SearchMethod,
    pub style: AnswerStyle,
    /// Ask for a JSON answer with a confidence estimate
    pub structured: bool,
    pub expand: bool,
    pub filter: Option<Metadata>,
}

impl AskOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            k: config.retrieval.default_k,
            method: config.retrieval.default_method,
            style: AnswerStyle::default(),
            structured: false,
            expand: false,
            filter: None,
        }
    }
}

pub struct RagPipeline {
    config: Config,
    splitter: TextSplitter,
    index: RwLock<KnowledgeIndex>,
    retriever: Retriever,
    answerer: Option<Answerer>,
    params: GenerationParams,
}

impl RagPipeline {
    /// Assemble a pipeline from parts; `generator` is optional
    pub fn new(
        config: Config,
        index: KnowledgeIndex,
        generator: Option<Arc<dyn GenerationProvider>>,
    ) -> Result<Self> {
        let splitter = TextSplitter::from_config(&config.chunking)?;
        let retriever = Retriever::new(config.retrieval.clone())?;
        let params = GenerationParams::from(&config.llm);
        let answerer = generator.map(|provider| Answerer::new(provider, params.clone()));

        Ok(Self {
            config,
            splitter,
            index: RwLock::new(index),
            retriever,
            answerer,
            params,
        })
    }

    /// Build providers and open the index described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let provider = provider_from_config(&config.embedding)?;
        let index = KnowledgeIndex::from_config(&config, provider)?;

        let generator: Option<Arc<dyn GenerationProvider>> = if config.llm.enabled {
            Some(Arc::new(OpenAiCompatibleProvider::from_config(&config.llm)?))
        } else {
            None
        };

        info!(
            "Pipeline ready: {} chunks, embedding model {}, generation {}",
            index.len(),
            index.model_name(),
            generator
                .as_ref()
                .map(|g| g.name().to_string())
                .unwrap_or_else(|| "disabled".to_string())
        );

        Self::new(config, index, generator)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_generator(&self) -> bool {
        self.answerer.is_some()
    }

    fn generator(&self) -> Option<&dyn GenerationProvider> {
        self.answerer.as_ref().map(|a| a.provider())
    }

    fn answerer(&self) -> Result<&Answerer> {
        self.answerer
            .as_ref()
            .ok_or(RaglineError::GenerationProvider(GenerationError::Disabled))
    }

    fn splitter_for(&self, chunking: &ChunkOverride) -> Result<TextSplitter> {
        if chunking.is_empty() {
            return Ok(self.splitter.clone());
        }
        Ok(TextSplitter::new(
            chunking.chunk_size.unwrap_or(self.splitter.chunk_size()),
            chunking.chunk_overlap.unwrap_or(self.splitter.chunk_overlap()),
        )?
        .with_separators(self.config.chunking.separators.iter().cloned())
        .with_strip_whitespace(self.config.chunking.strip_whitespace))
    }

    /// Chunk and index one document
    pub async fn ingest(&self, document: Document) -> Result<IngestReport> {
        self.ingest_batch_with(vec![document], &self.splitter).await
    }

    /// Chunk and index several documents; nothing is indexed unless all of them succeed
    pub async fn ingest_batch(&self, documents: Vec<Document>) -> Result<IngestReport> {
        self.ingest_batch_with(documents, &self.splitter).await
    }

    /// Read a UTF-8 file and index it with file provenance metadata
    pub async fn ingest_file(&self, path: &Path, metadata: Metadata) -> Result<IngestReport> {
        let document = Document::from_file(path, metadata)?;
        self.ingest(document).await
    }

    async fn ingest_batch_with(
        &self,
        documents: Vec<Document>,
        splitter: &TextSplitter,
    ) -> Result<IngestReport> {
        let started = Instant::now();

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            chunks.extend(splitter.chunk_document(document)?);
        }

        let total_chars: usize = chunks.iter().map(|c| c.content.chars().count()).sum();
        let chunk_count = chunks.len();

        let ids = {
            let mut index = self.index.write().await;
            index.add(chunks)?
        };

        let report = IngestReport {
            documents: documents.len(),
            chunks: chunk_count,
            ids,
            avg_chunk_chars: if chunk_count == 0 {
                0
            } else {
                total_chars / chunk_count
            },
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Indexed {} documents as {} chunks in {}ms",
            report.documents, report.chunks, report.duration_ms
        );
        Ok(report)
    }

    /// Search the index, expanding the query first when the request asks for it
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievalResult>> {
        Retriever::validate(request)?;

        {
            let index = self.index.read().await;
            if !index.initialized() {
                return Err(RaglineError::IndexNotInitialized);
            }
            if index.is_empty() {
                return Ok(Vec::new());
            }
        }

        let queries = self
            .retriever
            .expand_queries(request, self.generator(), &self.params)
            .await;

        let index = self.index.read().await;
        self.retriever.search_variants(&index, request, &queries)
    }

    /// Retrieve context for `question` and generate an answer
    pub async fn ask(&self, question: &str, options: &AskOptions) -> Result<AnswerResult> {
        let answerer = self.answerer()?;

        let mut request = SearchRequest::new(question, options.k)
            .with_method(options.method)
            .with_expansion(options.expand);
        request.filter = options.filter.clone();

        let results = self.search(&request).await?;
        debug!("Answering with {} retrieved chunks", results.len());

        let answer = if options.structured {
            answerer
                .answer_structured(question, &results, options.style)
                .await?
        } else {
            answerer.answer(question, &results, options.style).await?
        };

        Ok(answer)
    }

    /// Summarize what the collection says about `topic`
    pub async fn summarize(
        &self,
        topic: &str,
        kind: SummaryKind,
        max_length: usize,
        k: usize,
    ) -> Result<AnswerResult> {
        let answerer = self.answerer()?;
        let request =
            SearchRequest::new(topic, k).with_method(self.config.retrieval.default_method);
        let results = self.search(&request).await?;

        Ok(answerer.summarize(topic, &results, kind, max_length).await?)
    }

    /// One multi-turn chat exchange; the caller persists the session afterwards
    pub async fn chat(
        &self,
        session: &mut ChatSession,
        message: &str,
        k: usize,
    ) -> Result<AnswerResult> {
        let answerer = self.answerer()?;
        let request =
            SearchRequest::new(message, k).with_method(self.config.retrieval.default_method);
        let results = self.search(&request).await?;

        Ok(answerer
            .chat(session, message, &results, self.config.retrieval.history_turns)
            .await?)
    }

    pub async fn list(&self, limit: Option<usize>, filter: Option<&Metadata>) -> Vec<Chunk> {
        self.index.read().await.list(limit, filter)
    }

    pub async fn delete(&self, filter: &Metadata, confirm: bool) -> Result<usize> {
        self.index.write().await.delete(filter, confirm)
    }

    pub async fn clear(&self, confirm: bool) -> Result<usize> {
        self.index.write().await.clear(confirm)
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.read().await.stats()
    }

    /// Source-level precision, recall and F1 for every search method
    pub async fn evaluate(&self, cases: &[EvalCase], k: usize) -> Result<Vec<MethodMetrics>> {
        let index = self.index.read().await;
        evaluate(&self.retriever, &index, cases, k)
    }

    /// Validate and run a tool request; failures are reported in the response
    pub async fn dispatch(&self, request: ToolRequest) -> ToolResponse {
        let tool = request.name();
        match self.run_tool(request).await {
            Ok(data) => ToolResponse::success(tool, data),
            Err(e) => {
                debug!("Tool {} failed at {}: {}", tool, e.stage(), e);
                ToolResponse::failure(tool, &e)
            }
        }
    }

    async fn run_tool(&self, request: ToolRequest) -> Result<serde_json::Value> {
        request.validate()?;

        match request {
            ToolRequest::AddDocument {
                content,
                metadata,
                chunking,
            } => {
                let splitter = self.splitter_for(&chunking)?;
                let report = self
                    .ingest_batch_with(vec![Document { content, metadata }], &splitter)
                    .await?;
                to_value(&report)
            }
            ToolRequest::AddFile {
                path,
                metadata,
                chunking,
            } => {
                let splitter = self.splitter_for(&chunking)?;
                let document = Document::from_file(&path, metadata)?;
                let report = self.ingest_batch_with(vec![document], &splitter).await?;
                to_value(&report)
            }
            ToolRequest::BatchAdd {
                documents,
                chunking,
            } => {
                let splitter = self.splitter_for(&chunking)?;
                let report = self.ingest_batch_with(documents, &splitter).await?;
                to_value(&report)
            }
            ToolRequest::Search {
                query,
                k,
                method,
                filter,
                expand,
            } => {
                let mut request = SearchRequest::new(query, k)
                    .with_method(method.unwrap_or(self.config.retrieval.default_method))
                    .with_expansion(expand);
                request.filter = filter;
                let results = self.search(&request).await?;
                to_value(&results)
            }
            ToolRequest::SemanticSearch {
                query,
                k,
                filter,
                score_threshold,
            } => {
                let mut request =
                    SearchRequest::new(query, k).with_method(SearchMethod::Semantic);
                request.filter = filter;
                let mut results = self.search(&request).await?;
                if let Some(threshold) = score_threshold {
                    results.retain(|r| r.score >= threshold);
                }
                to_value(&results)
            }
            ToolRequest::AnswerQuestion {
                question,
                k,
                method,
                style,
                structured,
                expand,
            } => {
                let options = AskOptions {
                    k,
                    method: method.unwrap_or(self.config.retrieval.default_method),
                    style,
                    structured,
                    expand,
                    filter: None,
                };
                let answer = self.ask(&question, &options).await?;
                to_value(&answer)
            }
            ToolRequest::Summarize {
                topic,
                kind,
                max_length,
                k,
            } => {
                let summary = self.summarize(&topic, kind, max_length, k).await?;
                to_value(&summary)
            }
            ToolRequest::MultiTurnChat {
                message,
                session,
                k,
            } => {
                // no session is created when the exchange cannot run
                self.answerer()?;
                let manager = SessionManager::new(self.config.data_dir()?);
                let mut chat = manager.open_or_create(session.as_deref())?;
                let answer = self.chat(&mut chat, &message, k).await?;
                manager.save(&chat)?;
                Ok(json!({
                    "session": { "id": chat.id, "name": chat.name, "turns": chat.turns.len() },
                    "answer": to_value(&answer)?,
                }))
            }
            ToolRequest::ListDocuments { limit, filter } => {
                let chunks = self.list(limit, filter.as_ref()).await;
                to_value(&chunks)
            }
            ToolRequest::DeleteDocuments { filter, confirm } => {
                let deleted = self.delete(&filter, confirm).await?;
                Ok(json!({ "deleted": deleted }))
            }
            ToolRequest::ClearCollection { confirm } => {
                let deleted = self.clear(confirm).await?;
                Ok(json!({ "deleted": deleted }))
            }
            ToolRequest::GetStats => to_value(&self.stats().await),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RaglineError::Json {
        source: e,
        context: "Failed to serialize tool response".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingEmbedProvider};
    use crate::index::IndexOptions;

    fn pipeline() -> RagPipeline {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(HashingEmbedProvider::new(64).unwrap());
        let index = KnowledgeIndex::in_memory(provider, IndexOptions::default()).unwrap();
        let mut config = Config::default();
        config.chunking.chunk_size = 40;
        config.chunking.chunk_overlap = 5;
        RagPipeline::new(config, index, None).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let pipeline = pipeline();
        let report = pipeline
            .ingest(
                Document::new("Rust guarantees memory safety. Tokio runs async tasks.")
                    .with_meta("source", "intro.md"),
            )
            .await
            .unwrap();
        assert!(report.chunks >= 2);
        assert_eq!(report.ids.len(), report.chunks);

        let results = pipeline
            .search(&SearchRequest::new("memory safety", 1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.meta_str("source"), Some("intro.md"));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let pipeline = pipeline();
        let result = pipeline
            .ingest_batch(vec![Document::new("fine content"), Document::new("   ")])
            .await;
        assert!(matches!(result, Err(RaglineError::EmptyInput)));
        assert_eq!(pipeline.stats().await.total_chunks, 0);
    }

    #[tokio::test]
    async fn test_ask_without_generator() {
        let pipeline = pipeline();
        pipeline.ingest(Document::new("some text")).await.unwrap();

        let options = AskOptions::from_config(pipeline.config());
        let result = pipeline.ask("what?", &options).await;
        assert!(matches!(
            result,
            Err(RaglineError::GenerationProvider(GenerationError::Disabled))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_reports_stage() {
        let pipeline = pipeline();

        let response = pipeline
            .dispatch(ToolRequest::Search {
                query: "anything".to_string(),
                k: 3,
                method: None,
                filter: None,
                expand: false,
            })
            .await;
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().stage, "retrieval");

        let response = pipeline.dispatch(ToolRequest::GetStats).await;
        assert!(response.ok);
        assert_eq!(response.data.unwrap()["total_chunks"], 0);
    }

    #[tokio::test]
    async fn test_chunk_override() {
        let pipeline = pipeline();
        let response = pipeline
            .dispatch(ToolRequest::AddDocument {
                content: "a".repeat(100),
                metadata: Metadata::new(),
                chunking: ChunkOverride {
                    chunk_size: Some(50),
                    chunk_overlap: Some(0),
                },
            })
            .await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.data.unwrap()["chunks"], 2);
    }
}
