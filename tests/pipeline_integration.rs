//! End-to-end: answering, summaries, chat sessions, tool requests and evaluation

mod common;

use common::{pipeline, pipeline_in, sample_documents, ScriptedGenerator};
use ragline::generation::{AnswerStyle, SummaryKind, INSUFFICIENT_CONTEXT_ANSWER};
use ragline::pipeline::AskOptions;
use ragline::document::Document;
use ragline::error::RaglineError;
use ragline::retrieval::{EvalCase, SearchMethod, SearchRequest};
use ragline::session::SessionManager;
use ragline::tools::ToolRequest;
use tempfile::TempDir;

fn options(k: usize) -> AskOptions {
    AskOptions {
        k,
        method: SearchMethod::Hybrid,
        style: AnswerStyle::Concise,
        structured: false,
        expand: false,
        filter: None,
    }
}

#[tokio::test]
async fn test_ask_returns_generated_text_and_sources() {
    let generator = ScriptedGenerator::replying("Ownership and borrowing.");
    let pipeline = pipeline(Some(generator.clone()));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let answer = pipeline
        .ask("How does Rust keep memory safe?", &options(3))
        .await
        .unwrap();

    assert_eq!(answer.answer, "Ownership and borrowing.");
    assert_eq!(answer.retrieved_count, 3);
    assert_eq!(answer.method, "hybrid");
    assert!(answer.has_sufficient_context);
    assert!(answer.sources.contains(&"rust.md".to_string()));

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("[Document 1: "));
    assert!(prompt.contains("Question: How does Rust keep memory safe?"));
}

#[tokio::test]
async fn test_empty_context_gives_insufficient_answer() {
    let generator = ScriptedGenerator::replying("I made this up.");
    let pipeline = pipeline(Some(generator.clone()));
    pipeline.ingest_batch(sample_documents()).await.unwrap();
    pipeline.clear(true).await.unwrap();

    let answer = pipeline.ask("what is X?", &options(5)).await.unwrap();

    assert_eq!(generator.calls(), 0);
    assert_eq!(answer.answer, INSUFFICIENT_CONTEXT_ANSWER);
    assert!(!answer.has_sufficient_context);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn test_generation_errors_propagate() {
    let generator = ScriptedGenerator::failing("connection reset");
    let pipeline = pipeline(Some(generator));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let result = pipeline.ask("tokio?", &options(2)).await;
    let err = result.unwrap_err();
    assert_eq!(err.stage(), "generation");
}

#[tokio::test]
async fn test_structured_answer() {
    let generator = ScriptedGenerator::replying(
        r#"{"answer": "Tokio schedules futures.", "confidence": 0.8, "has_sufficient_context": true}"#,
    );
    let pipeline = pipeline(Some(generator));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let mut opts = options(2);
    opts.structured = true;
    let answer = pipeline.ask("What does tokio do?", &opts).await.unwrap();

    assert_eq!(answer.answer, "Tokio schedules futures.");
    assert_eq!(answer.confidence, Some(0.8));
}

#[tokio::test]
async fn test_summarize() {
    let generator = ScriptedGenerator::replying("Bread needs a starter.");
    let pipeline = pipeline(Some(generator.clone()));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let summary = pipeline
        .summarize("sourdough", SummaryKind::Executive, 200, 2)
        .await
        .unwrap();
    assert_eq!(summary.answer, "Bread needs a starter.");
    assert!(generator.prompts()[0].contains("Topic: sourdough"));
}

#[tokio::test]
async fn test_chat_session_persists_history() {
    let temp = TempDir::new().unwrap();
    let manager = SessionManager::new(temp.path().to_path_buf());

    let generator = ScriptedGenerator::with_replies(vec![
        Ok("Tokio is an async runtime.".to_string()),
        Ok("It uses worker threads.".to_string()),
    ]);
    let pipeline = pipeline(Some(generator.clone()));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let mut session = manager.open_or_create(Some("research")).unwrap();
    pipeline
        .chat(&mut session, "What is tokio?", 2)
        .await
        .unwrap();
    manager.save(&session).unwrap();

    let mut session = manager.open_or_create(Some("research")).unwrap();
    assert_eq!(session.turns.len(), 2);

    let reply = pipeline
        .chat(&mut session, "How does it schedule work?", 2)
        .await
        .unwrap();
    assert_eq!(reply.answer, "It uses worker threads.");
    assert_eq!(session.turns.len(), 4);

    let second_prompt = &generator.prompts()[1];
    assert!(second_prompt.contains("User: What is tokio?"));
    assert!(second_prompt.contains("Assistant: Tokio is an async runtime."));
}

#[tokio::test]
async fn test_tool_requests_round_trip() {
    let generator = ScriptedGenerator::replying("Answer from tools.");
    let pipeline = pipeline(Some(generator));

    let add = ToolRequest::from_json(
        r#"{"tool": "add_document", "arguments": {
            "content": "Tantivy implements BM25 ranking for full-text search.",
            "metadata": {"source": "tantivy.md"}
        }}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(add).await;
    assert!(response.ok, "{:?}", response.error);

    let batch = ToolRequest::from_json(
        r#"{"tool": "batch_add", "arguments": {"documents": [
            {"content": "HNSW builds a layered proximity graph.", "metadata": {"source": "hnsw.md"}},
            {"content": "SQLite stores the chunk entries.", "metadata": {"source": "sqlite.md"}}
        ]}}"#,
    )
    .unwrap();
    assert!(pipeline.dispatch(batch).await.ok);

    let search = ToolRequest::from_json(
        r#"{"tool": "search", "arguments": {"query": "BM25 ranking", "k": 2, "method": "bm25"}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(search).await;
    let results = response.data.unwrap();
    assert_eq!(results.as_array().unwrap().len(), 2);
    assert_eq!(results[0]["chunk"]["metadata"]["source"], "tantivy.md");

    let answer = ToolRequest::from_json(
        r#"{"tool": "answer_question", "arguments": {"question": "What ranks results?", "style": "analytical"}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(answer).await;
    assert_eq!(response.data.unwrap()["answer"], "Answer from tools.");

    let list = ToolRequest::from_json(
        r#"{"tool": "list_documents", "arguments": {"filter": {"source": "hnsw.md"}}}"#,
    )
    .unwrap();
    let listed = pipeline.dispatch(list).await.data.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let unsafe_delete =
        ToolRequest::from_json(r#"{"tool": "delete_documents", "arguments": {"filter": {}}}"#)
            .unwrap();
    let response = pipeline.dispatch(unsafe_delete).await;
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().stage, "indexing");

    let delete = ToolRequest::from_json(
        r#"{"tool": "delete_documents", "arguments": {"filter": {"source": "sqlite.md"}}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(delete).await;
    assert_eq!(response.data.unwrap()["deleted"], 1);

    let stats = pipeline
        .dispatch(ToolRequest::from_json(r#"{"tool": "get_stats"}"#).unwrap())
        .await;
    assert_eq!(stats.data.unwrap()["total_chunks"], 2);

    let clear = ToolRequest::from_json(
        r#"{"tool": "clear_collection", "arguments": {"confirm": true}}"#,
    )
    .unwrap();
    assert_eq!(pipeline.dispatch(clear).await.data.unwrap()["deleted"], 2);
}

#[tokio::test]
async fn test_semantic_search_tool_applies_threshold() {
    let pipeline = pipeline(None);
    pipeline.ingest_batch(sample_documents()).await.unwrap();
    let hnsw =
        Document::new("HNSW builds a layered proximity graph.").with_meta("source", "hnsw.md");
    pipeline.ingest(hnsw).await.unwrap();

    let request = ToolRequest::from_json(
        r#"{"tool": "semantic_search", "arguments": {"query": "HNSW builds a layered proximity graph.", "k": 3}}"#,
    )
    .unwrap();
    let results = pipeline.dispatch(request).await.data.unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r["method"] == "semantic"));

    let request = ToolRequest::from_json(
        r#"{"tool": "semantic_search", "arguments": {
            "query": "HNSW builds a layered proximity graph.", "k": 3, "score_threshold": 0.99
        }}"#,
    )
    .unwrap();
    let results = pipeline.dispatch(request).await.data.unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunk"]["metadata"]["source"], "hnsw.md");
}

#[tokio::test]
async fn test_multi_turn_chat_tool_keeps_session() {
    let temp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::with_replies(vec![
        Ok("Tokio is an async runtime.".to_string()),
        Ok("It uses worker threads.".to_string()),
    ]);
    let pipeline = pipeline_in(temp.path(), Some(generator.clone()));
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let first = ToolRequest::from_json(
        r#"{"tool": "multi_turn_chat", "arguments": {"message": "What is tokio?", "session": "notes", "k": 2}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(first).await;
    assert!(response.ok, "{:?}", response.error);
    let data = response.data.unwrap();
    assert_eq!(data["session"]["name"], "notes");
    assert_eq!(data["session"]["turns"], 2);
    assert_eq!(data["answer"]["answer"], "Tokio is an async runtime.");
    let session_id = data["session"]["id"].clone();

    let second = ToolRequest::from_json(
        r#"{"tool": "multi_turn_chat", "arguments": {"message": "How does it schedule work?", "session": "notes"}}"#,
    )
    .unwrap();
    let data = pipeline.dispatch(second).await.data.unwrap();
    assert_eq!(data["session"]["id"], session_id);
    assert_eq!(data["session"]["turns"], 4);
    assert!(generator.prompts()[1].contains("User: What is tokio?"));

    let stored = SessionManager::new(temp.path().to_path_buf())
        .find_by_name("notes")
        .unwrap()
        .unwrap();
    assert_eq!(stored.turns.len(), 4);
}

#[tokio::test]
async fn test_multi_turn_chat_tool_without_generator() {
    let temp = TempDir::new().unwrap();
    let pipeline = pipeline_in(temp.path(), None);
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let request = ToolRequest::from_json(
        r#"{"tool": "multi_turn_chat", "arguments": {"message": "hello"}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(request).await;
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().stage, "generation");
    assert!(SessionManager::new(temp.path().to_path_buf())
        .list_sessions()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_expansion_skipped_when_nothing_indexed() {
    let generator = ScriptedGenerator::replying("specific: tokio runtime");
    let pipeline = pipeline(Some(generator.clone()));

    let request = SearchRequest::new("tokio", 3).with_expansion(true);
    let result = pipeline.search(&request).await;
    assert!(matches!(result, Err(RaglineError::IndexNotInitialized)));
    assert_eq!(generator.calls(), 0);

    pipeline.ingest_batch(sample_documents()).await.unwrap();
    pipeline.clear(true).await.unwrap();
    assert!(pipeline.search(&request).await.unwrap().is_empty());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_huge_k_through_tools() {
    let pipeline = pipeline(None);
    pipeline.ingest_batch(sample_documents()).await.unwrap();
    let total = pipeline.stats().await.total_chunks;

    for method in ["semantic", "bm25", "hybrid"] {
        let request = ToolRequest::from_json(&format!(
            r#"{{"tool": "search", "arguments": {{"query": "rust", "k": {}, "method": "{}"}}}}"#,
            usize::MAX,
            method
        ))
        .unwrap();
        let response = pipeline.dispatch(request).await;
        assert!(response.ok, "{} {:?}", method, response.error);
        assert_eq!(response.data.unwrap().as_array().unwrap().len(), total, "{}", method);
    }
}

#[tokio::test]
async fn test_invalid_tool_arguments_rejected_before_core() {
    let generator = ScriptedGenerator::replying("unused");
    let pipeline = pipeline(Some(generator.clone()));

    let request = ToolRequest::from_json(
        r#"{"tool": "add_document", "arguments": {"content": "x", "chunk_size": 10, "chunk_overlap": 12}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(request).await;
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().stage, "chunking");
    assert_eq!(pipeline.stats().await.total_chunks, 0);

    let request = ToolRequest::from_json(
        r#"{"tool": "answer_question", "arguments": {"question": "   "}}"#,
    )
    .unwrap();
    let response = pipeline.dispatch(request).await;
    assert_eq!(response.error.unwrap().stage, "retrieval");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_evaluate_reports_every_method() {
    let pipeline = pipeline(None);
    pipeline.ingest_batch(sample_documents()).await.unwrap();

    let cases = vec![
        EvalCase {
            query: "sourdough starter".to_string(),
            expected_sources: vec!["bread.md".to_string()],
        },
        EvalCase {
            query: "asynchronous runtime futures".to_string(),
            expected_sources: vec!["tokio.md".to_string()],
        },
    ];

    let metrics = pipeline.evaluate(&cases, 1).await.unwrap();
    assert_eq!(metrics.len(), 3);
    for m in &metrics {
        assert!((0.0..=1.0).contains(&m.precision));
        assert!((0.0..=1.0).contains(&m.recall));
        assert!((0.0..=1.0).contains(&m.f1));
    }

    let lexical = metrics
        .iter()
        .find(|m| m.method == SearchMethod::Lexical)
        .unwrap();
    assert_eq!(lexical.recall, 1.0);
}
