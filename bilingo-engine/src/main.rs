//! bilingo - maintenance and inspection CLI for the content engine
//!
//! Every subcommand opens the engine on the resolved root folder, runs one
//! operation and prints the result as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use bilingo_common::config::{database_path, resolve_root_folder, EngineConfig, ROOT_ENV_VAR};
use bilingo_common::models::{MirrorKind, NewPair};
use bilingo_engine::service::{AuthenticatedUser, UpdateRequest};
use bilingo_engine::Engine;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{info, warn};

/// Command-line arguments for bilingo
#[derive(Parser, Debug)]
#[command(name = "bilingo")]
#[command(about = "Bilingual subtitle pair engine")]
#[command(version)]
struct Args {
    /// Root folder holding bilingo.db
    #[arg(short, long, global = true)]
    root_folder: Option<String>,

    /// Config file (default: ~/.config/bilingo/config.toml, then /etc/bilingo/config.toml)
    #[arg(short, long, global = true, env = "BILINGO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load normalized pairs, one JSON object per line
    Import { file: PathBuf },
    /// Print a random pair
    Random,
    /// Print a pair, or its neighbor within the same source file
    Show {
        id: String,
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
    },
    /// Search pairs; wrap the query in quotes for an exact phrase
    Search { query: String },
    /// Change a pair's rating on behalf of a user
    Rate {
        user: String,
        id: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Set or toggle off a pair's category on behalf of a user
    Tag { user: String, id: String, category: String },
    /// Rebuild the search index and report its size
    Reindex,
    /// Remove duplicate pairs
    Dedup,
    /// Print stored stats, or recompute them first
    Stats {
        #[arg(long)]
        compute: bool,
    },
    /// Delete every pair
    DeleteAll,
    /// List the most recent mirrors
    Mirrors {
        #[arg(short, long)]
        kind: Option<MirrorKind>,
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Create a user's progression state if missing
    Provision { user: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_jsonl(path: &PathBuf) -> Result<Vec<NewPair>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut pairs = Vec::new();

    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let pair: NewPair = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid pair record", path.display(), index + 1))?;
        pairs.push(pair);
    }

    Ok(pairs)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting bilingo v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = EngineConfig::load_or_default(args.config.as_deref())?;
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_ENV_VAR, &config);
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let engine = Engine::open(&db_path, config)
        .await
        .context("Failed to open engine")?;
    let result = run(&engine, args.command).await;
    engine.close().await;

    if let Err(e) = &result {
        match e.downcast_ref::<bilingo_common::Error>() {
            Some(err) if err.is_client_error() => {
                warn!("Request rejected: {}", err);
                std::process::exit(2);
            }
            _ => {}
        }
    }
    result
}

async fn run(engine: &Engine, command: Command) -> Result<()> {
    let service = engine.service();

    match command {
        Command::Import { file } => {
            let pairs = read_jsonl(&file)?;
            let inserted = service.ingest(pairs).await?;
            print_json(&serde_json::json!({ "inserted": inserted }))?;
        }
        Command::Random => match service.get_random().await? {
            Some(pick) => print_json(&pick)?,
            None => {
                warn!("Corpus is empty");
                print_json(&serde_json::Value::Null)?;
            }
        },
        Command::Show { id, offset } => {
            print_json(&service.get_with_offset(&id, offset).await?)?;
        }
        Command::Search { query } => {
            // The index lives in memory, so a fresh process loads it first
            service.reindex().await?;
            print_json(&service.search(&query).await?)?;
        }
        Command::Rate { user, id, delta } => {
            let outcome = service
                .apply_update(&AuthenticatedUser::new(user), &id, UpdateRequest::rating(delta))
                .await?;
            print_json(&outcome)?;
        }
        Command::Tag { user, id, category } => {
            let request = UpdateRequest::from_raw(None, Some(&category))?;
            let outcome = service
                .apply_update(&AuthenticatedUser::new(user), &id, request)
                .await?;
            print_json(&outcome)?;
        }
        Command::Reindex => {
            let indexed = service.reindex().await?;
            print_json(&serde_json::json!({ "indexed": indexed }))?;
        }
        Command::Dedup => print_json(&service.remove_duplicates().await?)?,
        Command::Stats { compute } => {
            let stats = if compute {
                service.compute_stats().await?
            } else {
                service.latest_stats().await?
            };
            print_json(&stats)?;
        }
        Command::DeleteAll => {
            let deleted = service.delete_all().await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::Mirrors { kind, limit } => {
            print_json(&service.recent_mirrors(kind, limit).await?)?;
        }
        Command::Provision { user } => print_json(&service.provision(&user).await?)?,
    }

    Ok(())
}
