//! Ragline - local retrieval-augmented generation
//!
//! Documents are split into overlapping chunks, embedded, and indexed for both semantic
//! (HNSW) and lexical (BM25) search. Retrieval runs either method or fuses both, can expand
//! the query through a text-generation provider, and feeds the ranked chunks to an
//! answerer that cites its sources.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod retrieval;
pub mod session;
pub mod tools;

pub use error::{RaglineError, Result};
