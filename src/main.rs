use lectern::cli::{flag_override, Cli, Commands, ConfigAction};
use lectern::config::Config;
use lectern::error::{LecternError, Result};
use lectern::pipeline::{record_answer, record_questions, Services};
use lectern::storage::{DocumentImport, QaMode, StorageStats};
use lectern::synthesis::AnswerStatus;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask {
            question,
            document,
            top_k,
            expand,
            no_expand,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            let expand = flag_override(expand, no_expand);
            cmd_ask(&config, &question, document, top_k, expand, json).await?;
        }
        Commands::Questions {
            document,
            paragraph,
            chapter,
            count,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_questions(&config, document, &chapter, &paragraph, count, json).await?;
        }
        Commands::Import { file } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_import(&config, &file).await?;
        }
        Commands::Stats => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(&config)?;
        }
        Commands::History { mode, limit, json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_history(&config, mode.as_deref(), limit, json)?;
        }
        Commands::Chunks {
            document,
            skip,
            limit,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_chunks(&config, document, skip, limit)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "lectern=debug" } else { "lectern=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run a request until it finishes, times out or Ctrl-C arrives
///
/// Dropping the future cancels every search and model call still in flight.
async fn run_request<F, T>(timeout: Duration, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = tokio::time::timeout(timeout, request) => {
            result.map_err(|_| {
                LecternError::Other(anyhow::anyhow!("Request timed out after {:?}", timeout))
            })?
        }
        _ = tokio::signal::ctrl_c() => {
            Err(LecternError::Other(anyhow::anyhow!("Interrupted")))
        }
    }
}

async fn cmd_ask(
    config: &Config,
    question: &str,
    document: Option<i64>,
    top_k: Option<usize>,
    expand: Option<bool>,
    json: bool,
) -> Result<()> {
    let services = Services::open(config)?;
    let pipeline = services.pipeline(config).await?;

    let answer = run_request(config.timeouts.request(), async {
        Ok::<_, LecternError>(
            pipeline
                .answer_question(question, document, top_k, expand)
                .await,
        )
    })
    .await?;

    if let Err(e) = record_answer(&services.storage.database, question, &answer) {
        tracing::warn!("Failed to record answer in history: {}", e);
    }

    if json {
        let output = serde_json::to_string_pretty(&answer).map_err(|e| LecternError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    println!("{}", answer.answer);
    if answer.status == AnswerStatus::SynthesisUnavailable {
        println!("\n(language model unavailable, showing the best matching fragment)");
    }
    if !answer.citations.is_empty() {
        println!("\nSources:");
        for citation in &answer.citations {
            println!("  {}", citation);
        }
    }
    println!(
        "\nConfidence: {:.2}  Time: {:.2}s",
        answer.confidence,
        answer.processing_time.as_secs_f64()
    );

    Ok(())
}

async fn cmd_questions(
    config: &Config,
    document: i64,
    chapter: &str,
    paragraph: &str,
    count: usize,
    json: bool,
) -> Result<()> {
    let services = Services::open(config)?;
    let pipeline = services.pipeline(config).await?;

    let questions = run_request(
        config.timeouts.request(),
        pipeline.generate_questions(document, chapter, paragraph, count),
    )
    .await?;

    if let Err(e) = record_questions(&services.storage.database, &questions) {
        tracing::warn!("Failed to record questions in history: {}", e);
    }

    if json {
        let output = serde_json::to_string_pretty(&questions).map_err(|e| LecternError::Json {
            source: e,
            context: "Failed to serialize questions".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if questions.is_empty() {
        println!("No questions could be generated");
        return Ok(());
    }

    for (i, q) in questions.iter().enumerate() {
        println!("{}. {}", i + 1, q.question);
        println!("   Answer: {} [page {}]", q.answer, q.page);
    }

    Ok(())
}

async fn cmd_import(config: &Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| LecternError::Io {
        source: e,
        context: format!("Failed to read import file: {:?}", file),
    })?;
    let import: DocumentImport = serde_json::from_str(&content).map_err(|e| LecternError::Json {
        source: e,
        context: format!("Invalid import file: {:?}", file),
    })?;

    let services = Services::open(config)?;
    let document_id = services.storage.import(&import)?;
    println!(
        "✓ Imported {} ({} chunks) as document {}",
        import.filename,
        import.chunks.len(),
        document_id
    );

    let report = services
        .indexer(config.embedding.batch_size)
        .index_pending()
        .await?;
    println!(
        "✓ Embedded {} chunks in {}ms ({} failed)",
        report.processed, report.duration_ms, report.failed
    );

    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let storage = Services::open_storage(config)?;
    let stats = storage.stats()?;

    println!("Lectern Status");
    println!("==============");
    println!("\nDatabase: {}", storage.db_path().display());
    println!("  Documents: {}", stats.db.document_count);
    println!("  Chunks: {}", stats.db.chunk_count);
    println!(
        "  Embedded: {} (configured model: {})",
        stats.db.embedded_count, config.embedding.model
    );
    println!(
        "  Data size: {}",
        StorageStats::format_size(stats.data_dir_size)
    );

    let documents = storage.database.documents()?;
    if !documents.is_empty() {
        println!("\nDocuments:");
        for doc in documents {
            println!(
                "  {} - {} ({} chunks, {})",
                doc.id,
                doc.filename,
                doc.total_chunks,
                doc.upload_date
            );
        }
    }

    Ok(())
}

fn cmd_history(config: &Config, mode: Option<&str>, limit: usize, json: bool) -> Result<()> {
    let storage = Services::open_storage(config)?;
    let entries = storage
        .database
        .qa_history(mode.and_then(QaMode::parse), limit)?;

    if json {
        let output = serde_json::to_string_pretty(&entries).map_err(|e| LecternError::Json {
            source: e,
            context: "Failed to serialize history".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history recorded yet");
        return Ok(());
    }

    for entry in entries {
        println!(
            "\n#{} [{}] {} ({})",
            entry.id,
            entry.mode.as_str(),
            entry.topic,
            entry.created_at
        );
        println!("  Q: {}", entry.query);
        println!(
            "  A: {}",
            lectern::text::truncate_with_ellipsis(entry.answer.trim(), 200)
        );
    }

    Ok(())
}

fn cmd_chunks(config: &Config, document: i64, skip: usize, limit: usize) -> Result<()> {
    let storage = Services::open_storage(config)?;
    let page = storage.database.document_chunks(document, skip, limit)?;

    println!(
        "Document {}: showing {} of {} chunks",
        document,
        page.chunks.len(),
        page.total
    );
    for chunk in page.chunks {
        let location = [chunk.chapter.as_str(), chunk.paragraph.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "\n[{}] page {} {}",
            chunk.position, chunk.page_number, location
        );
        println!(
            "  {}",
            lectern::text::truncate_with_ellipsis(chunk.content.trim(), 200)
        );
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, None)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
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

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
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
            "Config file not found, using defaults. Run 'lectern config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
