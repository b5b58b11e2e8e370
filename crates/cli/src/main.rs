use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{VERSION, outcome_json, repl, write_outcome};
use console::style;
use core_types::config::{AppConfig, load_or_create_config};
use indicatif::{ProgressBar, ProgressStyle};
use service::{
    Collaborators, IngestOptions, QueryOrchestrator, bootstrap, build_from_corpus,
    init_tracing_with_config,
};

/// Semantic search over a memory-mapped vector index.
#[derive(Parser, Debug)]
#[command(name = "mmsearch", version = VERSION, about = "Embedding-indexed document search")]
struct Cli {
    /// Config file (created with defaults when missing).
    #[arg(long, global = true, env = "MMSEARCH_CONFIG")]
    config: Option<PathBuf>,
    /// Vector index file; overrides `index.path`.
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    /// Document store location; overrides `store.endpoint`.
    #[arg(long, global = true)]
    store: Option<String>,
    /// HNSW search breadth; overrides `index.nprobe`.
    #[arg(long, global = true)]
    nprobe: Option<usize>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive loop: one query per line, `q` to quit.
    Repl,
    /// Run a single query and exit.
    Search {
        query: String,
        /// Number of neighbors to fetch.
        #[arg(short, long)]
        k: Option<usize>,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Build the vector index and document store from a JSONL corpus.
    Build {
        #[arg(long)]
        corpus: PathBuf,
        /// HNSW graph degree (0 = library default).
        #[arg(long, default_value_t = 0)]
        connectivity: usize,
        /// HNSW insertion breadth (0 = library default).
        #[arg(long, default_value_t = 0)]
        expansion_add: usize,
        #[arg(long, default_value_t = 256)]
        batch_size: usize,
    },
    /// Show index statistics and effective configuration.
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let _guard = init_tracing_with_config(&cfg.logging)?;

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => run_repl(&cfg),
        Commands::Search { query, k, json } => run_search(&cfg, &query, k, json),
        Commands::Build {
            corpus,
            connectivity,
            expansion_add,
            batch_size,
        } => run_build(
            &cfg,
            &corpus,
            &IngestOptions {
                connectivity,
                expansion_add,
                batch_size,
            },
        ),
        Commands::Info => run_info(&cfg),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = load_or_create_config(cli.config.as_deref()).context("load configuration")?;
    if let Some(index) = &cli.index {
        cfg.index.path = index.to_string_lossy().into_owned();
    }
    if let Some(store) = &cli.store {
        cfg.store.endpoint.clone_from(store);
    }
    if let Some(nprobe) = cli.nprobe {
        cfg.index.nprobe = nprobe;
    }
    cfg.validate().context("invalid command-line override")?;
    Ok(cfg)
}

fn open(cfg: &AppConfig) -> Result<QueryOrchestrator> {
    let collab = Collaborators::from_config(cfg)?;
    let stats = collab.index_stats()?;
    eprintln!(
        "{} {} vectors, ef {} ({:?}, model {})",
        style(">>> index loaded:").cyan(),
        stats.vectors,
        stats.expansion_search,
        stats.mode,
        stats.model
    );
    Ok(collab.orchestrator(&cfg.search))
}

fn run_repl(cfg: &AppConfig) -> Result<()> {
    let orchestrator = open(cfg)?;
    repl(
        &orchestrator,
        &mut io::stdin().lock(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
        cfg.search.preview_chars,
    )
}

fn run_search(cfg: &AppConfig, query: &str, k: Option<usize>, json: bool) -> Result<()> {
    let orchestrator = open(cfg)?;
    let outcome = orchestrator.search(query, k)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        write_outcome(&mut io::stdout().lock(), &outcome, cfg.search.preview_chars)?;
    }
    Ok(())
}

fn run_build(cfg: &AppConfig, corpus: &Path, opts: &IngestOptions) -> Result<()> {
    let embedder = bootstrap::build_embedder(&cfg.embedder)?;
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} embedded ({eta})")?
            .progress_chars("=> "),
    );

    let report = build_from_corpus(
        corpus,
        embedder.as_ref(),
        Path::new(&cfg.index.path),
        &cfg.store,
        opts,
        |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        },
    );
    bar.finish_and_clear();
    let report = report?;

    println!(
        "{} {} documents: {} indexed (M = {}), {} stored, {} skipped, {} duplicate uids",
        style("built").green().bold(),
        report.documents,
        report.index.vectors,
        report.index.connectivity,
        report.stored,
        report.skipped,
        report.duplicates
    );
    println!("index: {}", cfg.index.path);
    println!("store: {} ({:?})", cfg.store.endpoint, cfg.store.backend);
    Ok(())
}

fn run_info(cfg: &AppConfig) -> Result<()> {
    let index = bootstrap::open_index(&cfg.index)?;
    let stats = index.stats()?;
    println!("{}", style("index").bold());
    println!("  path:      {}", cfg.index.path);
    println!("  mode:      {:?}", stats.mode);
    println!("  dimension: {}", stats.dimension);
    println!("  vectors:   {}", stats.vectors);
    println!("  M:         {}", stats.connectivity);
    println!("  ef search: {}", stats.expansion_search);
    println!("  model:     {}", stats.model);
    println!("  bytes:     {}", stats.file_bytes);
    println!("{}", style("embedder").bold());
    println!("  backend:   {:?}", cfg.embedder.backend);
    println!("  model:     {}", cfg.embedder.model);
    println!("  dimension: {}", cfg.embedder.dimension);
    println!("{}", style("search").bold());
    println!("  default k: {}", cfg.search.default_k);
    println!("  max k:     {}", cfg.search.max_k);
    println!("{}", style("store").bold());
    println!("  backend:   {:?}", cfg.store.backend);
    println!("  endpoint:  {}", cfg.store.endpoint);
    Ok(())
}
