use ragline::cli::{parse_pairs, Cli, Commands, ConfigAction, SessionAction};
use ragline::config::{Config, ConfigValidator};
use ragline::context::format_context;
use ragline::document::Document;
use ragline::error::{RaglineError, Result};
use ragline::generation::{AnswerResult, AnswerStyle, SummaryKind};
use ragline::pipeline::{AskOptions, RagPipeline};
use ragline::retrieval::{EvalCase, SearchMethod, SearchRequest};
use ragline::session::{ChatSession, SessionManager};
use ragline::tools::ToolRequest;
use std::io::Read;
use std::path::PathBuf;
use uuid::Uuid;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| RaglineError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;

    let config_path = cli.config;
    let profile = cli.profile;

    // Handle commands
    match cli.command {
        Commands::Config { action } => cmd_config(config_path, profile, action),
        Commands::Sessions { action } => {
            let config = load_config(config_path, profile)?;
            cmd_sessions(&config, action)
        }
        command => {
            let mut config = load_config(config_path, profile)?;
            if let Commands::Ask { offline: true, .. } = command {
                config.llm.enabled = false;
            }
            runtime.block_on(run(config, command))
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ragline=debug" } else { "ragline=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: Config, command: Commands) -> Result<()> {
    let data_dir = config.data_dir()?;
    let pipeline = RagPipeline::from_config(config)?;

    match command {
        Commands::Add { content, meta } => {
            let document = Document {
                content,
                metadata: parse_pairs(&meta)?,
            };
            let report = pipeline.ingest(document).await?;
            println!(
                "✓ Indexed {} chunks (avg {} chars)",
                report.chunks, report.avg_chunk_chars
            );
        }
        Commands::AddFile { path, meta } => {
            let report = pipeline.ingest_file(&path, parse_pairs(&meta)?).await?;
            println!(
                "✓ Indexed {} as {} chunks (avg {} chars)",
                path.display(),
                report.chunks,
                report.avg_chunk_chars
            );
        }
        Commands::Search {
            query,
            k,
            method,
            filter,
            expand,
            json,
        } => {
            let k = k.unwrap_or(pipeline.config().retrieval.default_k);
            let mut request = SearchRequest::new(query, k)
                .with_method(parse_method(method, &pipeline)?)
                .with_expansion(expand);
            let filter = parse_pairs(&filter)?;
            if !filter.is_empty() {
                request.filter = Some(filter);
            }

            let results = pipeline.search(&request).await?;
            if json {
                println!("{}", to_json(&results)?);
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for (i, result) in results.iter().enumerate() {
                    println!(
                        "{}. [{:.4}] {} (id {})",
                        i + 1,
                        result.score,
                        result.label(i + 1),
                        result.id().map(|id| id.to_string()).unwrap_or_default()
                    );
                    println!("   {}", result.preview(200).replace('\n', " "));
                }
            }
        }
        Commands::Ask {
            question,
            offline,
            k,
            method,
            style,
            expand,
            structured,
            json,
        } => {
            let mut options = AskOptions::from_config(pipeline.config());
            options.k = k.unwrap_or(options.k);
            options.method = parse_method(method, &pipeline)?;
            options.style = style
                .parse::<AnswerStyle>()
                .map_err(RaglineError::InvalidRequest)?;
            options.expand = expand;
            options.structured = structured;

            if offline || !pipeline.has_generator() {
                if !offline {
                    tracing::warn!("Generation is disabled; showing retrieved context only");
                }
                let request = SearchRequest::new(question, options.k).with_method(options.method);
                let results = pipeline.search(&request).await?;
                println!("{}", format_context(&results));
                return Ok(());
            }

            let answer = pipeline.ask(&question, &options).await?;
            print_answer(&answer, json)?;
        }
        Commands::Summarize {
            topic,
            kind,
            max_length,
            k,
        } => {
            let kind = kind
                .parse::<SummaryKind>()
                .map_err(RaglineError::InvalidRequest)?;
            let k = k.unwrap_or(pipeline.config().retrieval.default_k);
            let summary = pipeline.summarize(&topic, kind, max_length, k).await?;
            print_answer(&summary, false)?;
        }
        Commands::Chat { message, session, k } => {
            let manager = SessionManager::new(data_dir);
            let mut chat = manager.open_or_create(session.as_deref())?;
            let k = k.unwrap_or(pipeline.config().retrieval.default_k);

            let answer = pipeline.chat(&mut chat, &message, k).await?;
            manager.save(&chat)?;

            println!("[{}] {}", chat.name, answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources: {}", answer.sources.join(", "));
            }
        }
        Commands::List { limit, filter } => {
            let filter = parse_pairs(&filter)?;
            let filter = (!filter.is_empty()).then_some(filter);
            let chunks = pipeline.list(Some(limit), filter.as_ref()).await;

            if chunks.is_empty() {
                println!("Collection is empty.");
            }
            for chunk in chunks {
                println!(
                    "{:>6}  {}  {}",
                    chunk.id.map(|id| id.to_string()).unwrap_or_default(),
                    chunk.meta_str("source").unwrap_or("-"),
                    chunk.preview(80).replace('\n', " ")
                );
            }
        }
        Commands::Delete { filter, confirm } => {
            let deleted = pipeline.delete(&parse_pairs(&filter)?, confirm).await?;
            println!("✓ Deleted {} chunks", deleted);
        }
        Commands::Clear { confirm } => {
            let deleted = pipeline.clear(confirm).await?;
            println!("✓ Cleared collection ({} chunks removed)", deleted);
        }
        Commands::Stats { json } => {
            let stats = pipeline.stats().await;
            if json {
                println!("{}", to_json(&stats)?);
            } else {
                println!("Chunks:      {}", stats.total_chunks);
                println!(
                    "Characters:  {} total, {:.0} avg, {}-{}",
                    stats.total_chars, stats.avg_chars, stats.min_chars, stats.max_chars
                );
                println!("Distinct:    {}", stats.distinct_contents);
                println!("Model:       {} ({} dims)", stats.model, stats.dimension);
                if let Some(dir) = &stats.directory {
                    println!("Directory:   {}", dir.display());
                }
                for (source, count) in &stats.sources {
                    println!("  {:<40} {}", source, count);
                }
            }
        }
        Commands::Eval { cases, k } => {
            let content = std::fs::read_to_string(&cases).map_err(|e| RaglineError::Io {
                source: e,
                context: format!("Failed to read evaluation cases: {}", cases.display()),
            })?;
            let cases: Vec<EvalCase> =
                serde_json::from_str(&content).map_err(|e| RaglineError::Json {
                    source: e,
                    context: "Failed to parse evaluation cases".to_string(),
                })?;
            let k = k.unwrap_or(pipeline.config().retrieval.default_k);

            let metrics = pipeline.evaluate(&cases, k).await?;
            println!("{:<10} {:>9} {:>9} {:>9}", "method", "precision", "recall", "f1");
            for m in metrics {
                println!(
                    "{:<10} {:>9.3} {:>9.3} {:>9.3}",
                    m.method.as_str(),
                    m.precision,
                    m.recall,
                    m.f1
                );
            }
        }
        Commands::Tool { request } => {
            let json = match request {
                Some(json) => json,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .map_err(|e| RaglineError::Io {
                            source: e,
                            context: "Failed to read tool request from stdin".to_string(),
                        })?;
                    buffer
                }
            };
            let request = ToolRequest::from_json(&json)?;
            let response = pipeline.dispatch(request).await;
            println!("{}", to_json(&response)?);
        }
        Commands::Sessions { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

fn parse_method(method: Option<String>, pipeline: &RagPipeline) -> Result<SearchMethod> {
    match method {
        Some(m) => m.parse().map_err(RaglineError::InvalidRequest),
        None => Ok(pipeline.config().retrieval.default_method),
    }
}

fn print_answer(answer: &AnswerResult, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!("\nSources ({} chunks, {}):", answer.retrieved_count, answer.method);
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, source);
        }
    }
    if let Some(confidence) = answer.confidence {
        println!("Confidence: {:.2}", confidence);
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| RaglineError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn find_session(manager: &SessionManager, key: &str) -> Result<ChatSession> {
    if let Ok(id) = Uuid::parse_str(key) {
        return manager.load_session(&id);
    }
    manager
        .find_by_name(key)?
        .ok_or_else(|| RaglineError::SessionNotFound {
            id: key.to_string(),
        })
}

fn cmd_sessions(config: &Config, action: SessionAction) -> Result<()> {
    let manager = SessionManager::new(config.data_dir()?);

    match action {
        SessionAction::List => {
            let sessions = manager.list_sessions()?;
            if sessions.is_empty() {
                println!("No chat sessions.");
            }
            for session in sessions {
                println!(
                    "{}  {:<24} {:>4} turns  {}",
                    session.id,
                    session.name,
                    session.turns.len(),
                    session.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        SessionAction::Show { session } => {
            let session = find_session(&manager, &session)?;
            println!("Session: {} ({})", session.name, session.id);
            for turn in &session.turns {
                println!("\n{}: {}", turn.role.as_str(), turn.content);
            }
        }
        SessionAction::Delete { session } => {
            let session = find_session(&manager, &session)?;
            manager.delete_session(&session.id)?;
            println!("✓ Deleted session {} ({})", session.name, session.id);
        }
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            println!("{}", to_json(&config)?);
        }
        ConfigAction::Validate => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RaglineError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ragline config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
