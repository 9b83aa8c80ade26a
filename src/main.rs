//! # ath CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ath init` | Create `.ath/`, scan the project and store its chunks |
//! | `ath status` | Show index statistics |
//! | `ath inspect <file>` | List the chunks of one file |
//! | `ath search "<query>"` | Rank chunks against a query |
//! | `ath chat` | Ask questions about the code |
//! | `ath config show\|set` | Show or change the assistant settings |

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ath::chat::Assistant;
use ath::config::{AssistantConfig, ProjectConfig, ProjectLayout};
use ath::db::{Db, StoreError};
use ath::indexer::Scanner;
use ath::retriever::{self, DEFAULT_TOP_K};

const DOC_PREVIEW_CHARS: usize = 80;

#[derive(Parser)]
#[command(
    name = "ath",
    about = "Index a Python project and ask questions about it",
    version
)]
struct Cli {
    /// Assistant config file (provider, model, API keys).
    ///
    /// Defaults to `<config dir>/ath/assistant.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index for a project and fill it.
    Init {
        /// Project root.
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Rebuild even if the project is already initialized.
        #[arg(long)]
        force: bool,
    },

    /// Show what is indexed.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List the chunks of one file (path relative to the project root).
    Inspect {
        file: String,

        #[arg(long)]
        json: bool,
    },

    /// Rank indexed chunks against a query without calling a model.
    Search {
        query: String,

        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        #[arg(long)]
        json: bool,
    },

    /// Interactive question answering.
    Chat {
        /// ollama, openai or anthropic.
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Show or change the assistant settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the settings with API keys masked.
    Show,

    /// Set `provider`, `model`, `base_url` or `<provider>_key`.
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Status { json } => cmd_status(json),
        Commands::Inspect { file, json } => cmd_inspect(&file, json),
        Commands::Search { query, top_k, json } => cmd_search(&query, top_k, json),
        Commands::Chat { provider, model } => cmd_chat(cli.config.as_deref(), provider, model),
        Commands::Config { action } => cmd_config(cli.config.as_deref(), action),
    }
}

fn assistant_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(AssistantConfig::default_path)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode JSON")?
    );
    Ok(())
}

fn reinit_hint(err: StoreError) -> anyhow::Error {
    anyhow::Error::new(err).context("index unusable; run `ath init --force` to rebuild it")
}

fn current_project() -> Result<(ProjectLayout, Db)> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let Some(layout) = ProjectLayout::discover(&cwd) else {
        bail!("no ath index found in {} or its parents; run `ath init` first", cwd.display());
    };
    let db = Db::open_existing(layout.db_path()).map_err(reinit_hint)?;
    if !db.is_initialized().map_err(reinit_hint)? {
        return Err(reinit_hint(StoreError::SchemaMissing));
    }
    Ok((layout, db))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("project root not found: {}", path.display()))?;
    let layout = ProjectLayout::new(&root);

    if layout.data_dir().exists() && !force {
        println!("Already initialized at {}", layout.data_dir().display());
        println!("Use `ath init --force` to rebuild the index.");
        return Ok(());
    }

    std::fs::create_dir_all(layout.data_dir())
        .with_context(|| format!("failed to create {}", layout.data_dir().display()))?;
    let db_path = layout.db_path();
    if force && db_path.exists() {
        info!("Removing existing database {}", db_path.display());
        std::fs::remove_file(&db_path)
            .with_context(|| format!("failed to remove {}", db_path.display()))?;
    }

    let mut db = Db::open(&db_path).map_err(reinit_hint)?;
    db.initialize().map_err(reinit_hint)?;
    ProjectConfig::new().save(&layout.config_path())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(format!("Scanning {}...", root.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = Scanner::new(&root)?.scan()?;
    spinner.finish_with_message(format!(
        "Scanned {} Python files ({} skipped).",
        report.files_scanned,
        report.skipped.len()
    ));

    let stored = db.replace_all(&report.chunks).map_err(reinit_hint)?;
    let stats = db.stats().map_err(reinit_hint)?;

    println!("Indexed {stored} chunks from {} files", stats.distinct_files);
    println!("  functions: {}", stats.function_count);
    println!("  classes:   {}", stats.class_count);
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.path, skipped.error);
    }
    Ok(())
}

fn cmd_status(json: bool) -> Result<()> {
    let (layout, db) = current_project()?;
    let stats = db.stats().map_err(reinit_hint)?;
    let history = db.chat_history_len().map_err(reinit_hint)?;
    let db_size = std::fs::metadata(layout.db_path())
        .map(|m| m.len())
        .unwrap_or(0);

    if json {
        return print_json(&serde_json::json!({
            "project": layout.root,
            "stats": stats,
            "db_bytes": db_size,
            "chat_history": history,
        }));
    }

    println!("Project:      {}", layout.root.display());
    match ProjectConfig::load(&layout.config_path()) {
        Ok(cfg) => println!("Initialized:  {} (v{})", cfg.initialized_at, cfg.version),
        Err(e) => warn!("{e:#}"),
    }
    println!("Files:        {}", stats.distinct_files);
    println!("Chunks:       {}", stats.total_chunks);
    println!("  functions:  {}", stats.function_count);
    println!("  classes:    {}", stats.class_count);
    println!("Database:     {:.1} KB", db_size as f64 / 1024.0);
    println!("Chat history: {history} exchanges");
    Ok(())
}

fn cmd_inspect(file: &str, json: bool) -> Result<()> {
    let (_, db) = current_project()?;
    let file_path = file.replace('\\', "/");
    let file_path = file_path.trim_start_matches("./");

    let chunks = db.list_by_file(file_path).map_err(reinit_hint)?;
    if json {
        return print_json(&chunks);
    }
    if chunks.is_empty() {
        println!("No chunks indexed for {file_path}");
        return Ok(());
    }

    println!("{file_path}: {} chunks", chunks.len());
    for chunk in &chunks {
        println!(
            "  {:<8} {} (lines {}-{})",
            chunk.chunk_type.as_str().to_uppercase(),
            chunk.name,
            chunk.line_start,
            chunk.line_end
        );
        if let Some(first) = chunk.docstring.lines().next().filter(|l| !l.is_empty()) {
            let preview: String = first.chars().take(DOC_PREVIEW_CHARS).collect();
            println!("           {preview}");
        }
    }
    Ok(())
}

fn cmd_search(query: &str, top_k: usize, json: bool) -> Result<()> {
    let (_, db) = current_project()?;
    let chunks = db.list_all().map_err(reinit_hint)?;
    let ranked = retriever::rank(query, &chunks);

    if json {
        let hits: Vec<serde_json::Value> = ranked
            .iter()
            .take(top_k)
            .map(|hit| serde_json::json!({ "score": hit.score, "chunk": hit.chunk }))
            .collect();
        return print_json(&hits);
    }

    if ranked.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }
    for hit in ranked.iter().take(top_k) {
        println!(
            "{:>4}  {:<8} {}  {}:{}",
            hit.score,
            hit.chunk.chunk_type.as_str().to_uppercase(),
            hit.chunk.name,
            hit.chunk.file_path,
            hit.chunk.line_start
        );
    }
    Ok(())
}

fn cmd_chat(
    config_path: Option<&Path>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let (layout, db) = current_project()?;

    let mut config = match assistant_config_path(config_path) {
        Some(path) => AssistantConfig::load(&path)?,
        None => AssistantConfig::default(),
    };
    if let Some(provider) = provider {
        config.provider = provider.parse()?;
    }
    if let Some(model) = model {
        config.model = model;
    }

    let top_k = match ProjectConfig::load(&layout.config_path()) {
        Ok(cfg) => cfg.settings.max_context_chunks,
        Err(e) => {
            warn!("{e:#}; using default settings");
            ProjectConfig::default().settings.max_context_chunks
        }
    };

    let generator = ath::generator::from_config(&config)?;
    let assistant = Assistant::new(&db, &*generator, top_k);

    println!(
        "Chatting with {} ({}). Type `exit`, `quit` or `q` to leave.",
        assistant.generator_name(),
        config.model
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut line = String::new();
    loop {
        print!("\nYou: ");
        stdout.flush().context("failed to flush stdout")?;

        line.clear();
        if stdin.lock().read_line(&mut line).context("failed to read input")? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        let answer = assistant.ask(question);
        println!("\nAth: {}", answer.text);
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let Some(path) = assistant_config_path(config_path) else {
        bail!("no config directory on this platform; pass --config <file>");
    };
    let mut config = AssistantConfig::load(&path)?;

    match action {
        ConfigAction::Show => {
            println!("# {}", path.display());
            print_json(&config.masked())
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(&path)?;
            println!("Saved {key} to {}", path.display());
            Ok(())
        }
    }
}
