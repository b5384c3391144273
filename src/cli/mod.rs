//! CLI command definitions and parsing
use crate::document::Metadata;
use crate::error::{RaglineError, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragline",
    version,
    author = "neur0map",
    about = "Local retrieval-augmented generation: chunk, index, search and answer",
    long_about = "Ragline splits documents into overlapping chunks, indexes them for semantic and \
                  BM25 search, retrieves the most relevant chunks with optional query expansion, \
                  and answers questions from them through an OpenAI-compatible endpoint."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragline/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "offline", "keyword")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index text given on the command line
    Add {
        /// Document text
        content: String,

        /// Metadata as key=value (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Index a UTF-8 text file
    AddFile {
        /// File to read
        path: PathBuf,

        /// Extra metadata as key=value (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Search the index
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long)]
        k: Option<usize>,

        /// Ranking method: semantic, lexical (bm25) or hybrid
        #[arg(short, long)]
        method: Option<String>,

        /// Metadata filter as key=value (repeatable)
        #[arg(short, long, value_name = "KEY=VALUE")]
        filter: Vec<String>,

        /// Expand the query with the generation provider first
        #[arg(long)]
        expand: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed documents
    Ask {
        /// Question to ask
        question: String,

        /// Only show the retrieved context; never call the generation provider
        #[arg(long)]
        offline: bool,

        /// Number of context chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,

        /// Ranking method: semantic, lexical (bm25) or hybrid
        #[arg(short, long)]
        method: Option<String>,

        /// Answer style
        #[arg(short, long, value_parser = ["detailed", "concise", "analytical"], default_value = "detailed")]
        style: String,

        /// Expand the query with the generation provider first
        #[arg(long)]
        expand: bool,

        /// Ask for a structured answer with a confidence estimate
        #[arg(long)]
        structured: bool,

        /// Show the answer in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Summarize what the collection says about a topic
    Summarize {
        /// Topic or query
        topic: String,

        /// Summary shape
        #[arg(long, value_parser = ["executive", "detailed", "bullet_points"], default_value = "detailed")]
        kind: String,

        /// Approximate maximum length in characters
        #[arg(long, default_value = "500")]
        max_length: usize,

        /// Number of chunks to summarize
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Multi-turn chat over the indexed documents
    Chat {
        /// Message to send
        message: String,

        /// Session ID or name (a new name starts a new session)
        #[arg(short, long)]
        session: Option<String>,

        /// Number of context chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// List indexed chunks
    List {
        /// Maximum number of chunks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Metadata filter as key=value (repeatable)
        #[arg(short, long, value_name = "KEY=VALUE")]
        filter: Vec<String>,
    },

    /// Delete chunks whose metadata matches every filter pair
    Delete {
        /// Metadata filter as key=value (repeatable)
        #[arg(short, long, value_name = "KEY=VALUE")]
        filter: Vec<String>,

        /// Required when the filter is empty (deletes everything)
        #[arg(long)]
        confirm: bool,
    },

    /// Remove every chunk from the collection
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        confirm: bool,
    },

    /// Show collection statistics
    Stats {
        /// Show statistics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Evaluate every search method against labelled queries
    Eval {
        /// JSON file holding a list of {"query", "expected_sources"} cases
        cases: PathBuf,

        /// Retrieval depth
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Run a JSON tool request ({"tool": ..., "arguments": {...}})
    Tool {
        /// Request JSON; read from stdin when omitted
        request: Option<String>,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List chat sessions, most recent first
    List,

    /// Show the turns of a session
    Show {
        /// Session ID or name
        session: String,
    },

    /// Delete a chat session
    Delete {
        /// Session ID or name
        session: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Validate the configuration file
    Validate,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse repeated `key=value` arguments into metadata
///
/// Values that parse as JSON (numbers, booleans, quoted strings) keep their type;
/// anything else is taken as a plain string.
pub fn parse_pairs(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            RaglineError::InvalidRequest(format!("Expected key=value, got '{}'", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(RaglineError::InvalidRequest(format!(
                "Empty key in '{}'",
                pair
            )));
        }
        let value = serde_json::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::from(value));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "ragline", "search", "tokio", "-k", "3", "-m", "bm25", "-f", "source=a.md",
        ]);
        match cli.command {
            Commands::Search {
                query, k, method, filter, ..
            } => {
                assert_eq!(query, "tokio");
                assert_eq!(k, Some(3));
                assert_eq!(method.as_deref(), Some("bm25"));
                assert_eq!(filter, vec!["source=a.md"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_profile() {
        let cli = Cli::parse_from(["ragline", "stats", "--profile", "offline"]);
        assert_eq!(cli.profile.as_deref(), Some("offline"));
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = vec![
            "source=a.md".to_string(),
            "page=3".to_string(),
            "draft=true".to_string(),
        ];
        let metadata = parse_pairs(&pairs).unwrap();
        assert_eq!(metadata["source"], Value::from("a.md"));
        assert_eq!(metadata["page"], Value::from(3));
        assert_eq!(metadata["draft"], Value::from(true));

        assert!(parse_pairs(&["no-equals".to_string()]).is_err());
        assert!(parse_pairs(&["=x".to_string()]).is_err());
    }
}
