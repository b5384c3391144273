//! Grounded answers, summaries and multi-turn chat over retrieved context

use crate::context::{format_context, source_labels};
use crate::generation::{GenerationError, GenerationParams, GenerationProvider};
use crate::retrieval::RetrievalResult;
use crate::session::ChatSession;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Returned without calling the provider when nothing was retrieved
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I don't have enough information in the knowledge base to answer this question.";

/// Answer tone requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    #[default]
    Detailed,
    Concise,
    Analytical,
}

impl AnswerStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detailed => "detailed",
            Self::Concise => "concise",
            Self::Analytical => "analytical",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Detailed => {
                "Answer the question with a detailed, comprehensive response based on the context."
            }
            Self::Concise => {
                "Answer the question concisely, focusing on the key points in the context."
            }
            Self::Analytical => {
                "Analyze the context in depth and give an insightful, well-reasoned answer."
            }
        }
    }
}

impl fmt::Display for AnswerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detailed" => Ok(Self::Detailed),
            "concise" => Ok(Self::Concise),
            "analytical" => Ok(Self::Analytical),
            other => Err(format!(
                "Unknown answer style '{}' (expected detailed, concise or analytical)",
                other
            )),
        }
    }
}

/// Summary shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Executive,
    #[default]
    Detailed,
    BulletPoints,
}

impl SummaryKind {
    fn instruction(&self) -> &'static str {
        match self {
            Self::Executive => "Write a short executive summary highlighting the conclusions.",
            Self::Detailed => "Write a detailed summary covering every important point.",
            Self::BulletPoints => "Summarize the material as a list of bullet points.",
        }
    }
}

impl FromStr for SummaryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "executive" => Ok(Self::Executive),
            "detailed" => Ok(Self::Detailed),
            "bullet_points" | "bullets" => Ok(Self::BulletPoints),
            other => Err(format!(
                "Unknown summary kind '{}' (expected executive, detailed or bullet_points)",
                other
            )),
        }
    }
}

/// Generated answer plus provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<String>,
    pub retrieved_count: usize,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub has_sufficient_context: bool,
}

impl AnswerResult {
    fn insufficient(method: String) -> Self {
        Self {
            answer: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
            sources: Vec::new(),
            retrieved_count: 0,
            method,
            confidence: None,
            has_sufficient_context: false,
        }
    }
}

/// What the structured prompt asks the model to return
#[derive(Debug, Deserialize)]
struct StructuredReply {
    answer: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default = "default_sufficient")]
    has_sufficient_context: bool,
}

fn default_sufficient() -> bool {
    true
}

/// Outermost `{...}` span of a reply, tolerating code fences and chatter around it
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn method_of(results: &[RetrievalResult]) -> String {
    results
        .first()
        .map(|r| r.method.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Turns retrieved chunks into prompts and sends them to a generation provider
pub struct Answerer {
    provider: Arc<dyn GenerationProvider>,
    params: GenerationParams,
}

impl Answerer {
    pub fn new(provider: Arc<dyn GenerationProvider>, params: GenerationParams) -> Self {
        Self { provider, params }
    }

    pub fn provider(&self) -> &dyn GenerationProvider {
        self.provider.as_ref()
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn prompt(style: AnswerStyle, context: &str, question: &str) -> String {
        format!(
            "{}\nIf the context does not contain enough information to answer fully, say so \
explicitly.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
            style.instruction(),
            context,
            question.trim()
        )
    }

    /// Answer `question` from `results`; the provider is not called when `results` is empty
    pub async fn answer(
        &self,
        question: &str,
        results: &[RetrievalResult],
        style: AnswerStyle,
    ) -> Result<AnswerResult, GenerationError> {
        let method = method_of(results);
        if results.is_empty() {
            debug!("No context retrieved; skipping generation");
            return Ok(AnswerResult::insufficient(method));
        }

        let prompt = Self::prompt(style, &format_context(results), question);
        let answer = self.provider.generate(&prompt, &self.params).await?;

        Ok(AnswerResult {
            answer,
            sources: source_labels(results),
            retrieved_count: results.len(),
            method,
            confidence: None,
            has_sufficient_context: true,
        })
    }

    /// Like [`answer`](Self::answer), but asks for a JSON object with a confidence estimate
    ///
    /// A reply that does not parse is used verbatim as the answer.
    pub async fn answer_structured(
        &self,
        question: &str,
        results: &[RetrievalResult],
        style: AnswerStyle,
    ) -> Result<AnswerResult, GenerationError> {
        let method = method_of(results);
        if results.is_empty() {
            return Ok(AnswerResult::insufficient(method));
        }

        let prompt = format!(
            "{}\n\nRespond with only a JSON object of the form \
{{\"answer\": string, \"confidence\": number between 0 and 1, \
\"has_sufficient_context\": boolean}}.",
            Self::prompt(style, &format_context(results), question)
        );
        let reply = self.provider.generate(&prompt, &self.params).await?;

        let parsed = json_object(&reply)
            .and_then(|body| serde_json::from_str::<StructuredReply>(body).ok());

        let (answer, confidence, has_sufficient_context) = match parsed {
            Some(structured) => (
                structured.answer,
                structured.confidence.map(|c| c.clamp(0.0, 1.0)),
                structured.has_sufficient_context,
            ),
            None => {
                warn!("Structured answer did not parse; using the plain reply");
                (reply, None, true)
            }
        };

        Ok(AnswerResult {
            answer,
            sources: source_labels(results),
            retrieved_count: results.len(),
            method,
            confidence,
            has_sufficient_context,
        })
    }

    /// Summarize what the retrieved chunks say about `topic`
    pub async fn summarize(
        &self,
        topic: &str,
        results: &[RetrievalResult],
        kind: SummaryKind,
        max_length: usize,
    ) -> Result<AnswerResult, GenerationError> {
        let method = method_of(results);
        if results.is_empty() {
            return Ok(AnswerResult::insufficient(method));
        }

        let prompt = format!(
            "{}\nKeep it under {} characters and use only the material below.\n\n\
Topic: {}\n\nMaterial:\n{}\n\nSummary:",
            kind.instruction(),
            max_length,
            topic.trim(),
            format_context(results)
        );
        let summary = self.provider.generate(&prompt, &self.params).await?;

        Ok(AnswerResult {
            answer: summary,
            sources: source_labels(results),
            retrieved_count: results.len(),
            method,
            confidence: None,
            has_sufficient_context: true,
        })
    }

    /// One chat turn: prior turns and fresh context go into the prompt, both sides are recorded
    pub async fn chat(
        &self,
        session: &mut ChatSession,
        message: &str,
        results: &[RetrievalResult],
        history_turns: usize,
    ) -> Result<AnswerResult, GenerationError> {
        let method = method_of(results);

        if results.is_empty() {
            session.push_user(message.trim());
            session.push_assistant(INSUFFICIENT_CONTEXT_ANSWER, Vec::new());
            return Ok(AnswerResult::insufficient(method));
        }

        let history = session.history_text(history_turns);
        let history = if history.is_empty() {
            "(no earlier messages)".to_string()
        } else {
            history
        };

        let prompt = format!(
            "You are a helpful assistant answering from a knowledge base. Use the conversation \
so far to resolve references in the new message.\n\n\
Conversation so far:\n{}\n\nContext:\n{}\n\nUser: {}\nAssistant:",
            history,
            format_context(results),
            message.trim()
        );
        let answer = self.provider.generate(&prompt, &self.params).await?;
        let sources = source_labels(results);

        session.push_user(message.trim());
        session.push_assistant(answer.clone(), sources.clone());

        Ok(AnswerResult {
            answer,
            sources,
            retrieved_count: results.len(),
            method,
            confidence: None,
            has_sufficient_context: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, Metadata};
    use crate::retrieval::SearchMethod;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a fixed string and records every prompt
    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn results() -> Vec<RetrievalResult> {
        let mut a = Metadata::new();
        a.insert("source".into(), json!("rust.md"));
        let mut b = Metadata::new();
        b.insert("title".into(), json!("Tokio Guide"));
        vec![
            RetrievalResult::new(
                Chunk::new("Rust has ownership.", a.clone()),
                0.9,
                SearchMethod::Hybrid,
            ),
            RetrievalResult::new(Chunk::new("Tokio runs futures.", b), 0.8, SearchMethod::Hybrid),
            RetrievalResult::new(Chunk::new("Borrowing is checked.", a), 0.7, SearchMethod::Hybrid),
        ]
    }

    #[tokio::test]
    async fn test_empty_results_skip_provider() {
        let provider = Scripted::new("should not be used");
        let answerer = Answerer::new(provider.clone(), GenerationParams::default());

        let result = answerer
            .answer("What is Rust?", &[], AnswerStyle::Detailed)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(result.answer, INSUFFICIENT_CONTEXT_ANSWER);
        assert!(!result.has_sufficient_context);
        assert!(result.sources.is_empty());
        assert_eq!(result.retrieved_count, 0);
    }

    #[tokio::test]
    async fn test_answer_verbatim_with_sources() {
        let provider = Scripted::new("Rust uses ownership.");
        let answerer = Answerer::new(provider.clone(), GenerationParams::default());

        let result = answerer
            .answer("How does Rust manage memory?", &results(), AnswerStyle::Concise)
            .await
            .unwrap();

        assert_eq!(result.answer, "Rust uses ownership.");
        assert_eq!(result.sources, vec!["rust.md", "Tokio Guide"]);
        assert_eq!(result.retrieved_count, 3);
        assert_eq!(result.method, "hybrid");

        let prompt = provider.last_prompt();
        assert!(prompt.starts_with(AnswerStyle::Concise.instruction()));
        assert!(prompt.contains("[Document 1: rust.md]\nRust has ownership."));
        assert!(prompt.contains("Question: How does Rust manage memory?"));
    }

    #[tokio::test]
    async fn test_structured_parses_fenced_json() {
        let provider = Scripted::new(
            "```json\n{\"answer\": \"Ownership.\", \"confidence\": 1.4, \"has_sufficient_context\": true}\n```",
        );
        let answerer = Answerer::new(provider, GenerationParams::default());

        let result = answerer
            .answer_structured("memory?", &results(), AnswerStyle::Detailed)
            .await
            .unwrap();
        assert_eq!(result.answer, "Ownership.");
        assert_eq!(result.confidence, Some(1.0));
        assert!(result.has_sufficient_context);
    }

    #[tokio::test]
    async fn test_structured_falls_back_to_plain() {
        let provider = Scripted::new("Just prose, no JSON.");
        let answerer = Answerer::new(provider, GenerationParams::default());

        let result = answerer
            .answer_structured("memory?", &results(), AnswerStyle::Detailed)
            .await
            .unwrap();
        assert_eq!(result.answer, "Just prose, no JSON.");
        assert_eq!(result.confidence, None);
    }

    #[tokio::test]
    async fn test_summarize_prompt() {
        let provider = Scripted::new("- ownership\n- async");
        let answerer = Answerer::new(provider.clone(), GenerationParams::default());

        let result = answerer
            .summarize("rust", &results(), SummaryKind::BulletPoints, 300)
            .await
            .unwrap();
        assert_eq!(result.answer, "- ownership\n- async");
        assert!(provider.last_prompt().contains("under 300 characters"));
    }

    #[tokio::test]
    async fn test_chat_records_turns_and_history() {
        let provider = Scripted::new("It checks borrows at compile time.");
        let answerer = Answerer::new(provider.clone(), GenerationParams::default());
        let mut session = ChatSession::new("test");
        session.push_user("What is Rust?");
        session.push_assistant("A systems language.", vec![]);

        answerer
            .chat(&mut session, "How is memory managed?", &results(), 6)
            .await
            .unwrap();

        assert_eq!(session.turns.len(), 4);
        assert_eq!(session.turns[3].content, "It checks borrows at compile time.");
        assert_eq!(session.turns[3].sources, vec!["rust.md", "Tokio Guide"]);
        assert!(provider
            .last_prompt()
            .contains("User: What is Rust?\nAssistant: A systems language."));
    }

    #[test]
    fn test_style_and_kind_parsing() {
        assert_eq!("Analytical".parse::<AnswerStyle>().unwrap(), AnswerStyle::Analytical);
        assert!("verbose".parse::<AnswerStyle>().is_err());
        assert_eq!("bullet-points".parse::<SummaryKind>().unwrap(), SummaryKind::BulletPoints);
    }
}
