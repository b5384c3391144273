//! Text generation: providers and the answerer built on them

mod answer;
mod provider;

pub use answer::{AnswerResult, AnswerStyle, Answerer, SummaryKind, INSUFFICIENT_CONTEXT_ANSWER};
pub use provider::{
    GenerationError, GenerationParams, GenerationProvider, OpenAiCompatibleProvider,
};
