mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use covidcast::SyncEngine;
use covidcast_delphi::EpidataClient;
use covidcast_store::{RevisionLedger, SqliteObjectStore};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "covidcast-sync")]
#[command(about = "Mirror COVIDcast signals from the Epidata API into versioned dataset revisions")]
struct Cli {
    /// Config file (defaults to ~/.config/covidcast-sync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch stale partitions, write artifacts and publish a revision
    Sync {
        /// Write artifacts but do not publish a revision
        #[arg(long)]
        dry_run: bool,
    },
    /// Show which partitions are stale without fetching them
    Plan,
    /// List published revisions
    Revisions,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_ledger(app: &AppConfig, max_batch_size: usize) -> Result<RevisionLedger> {
    let path = app.data_dir()?.join("revisions.db");
    let ledger = RevisionLedger::open(&path)
        .with_context(|| format!("failed to open revision ledger: {}", path.display()))?;
    Ok(ledger.with_max_batch_size(max_batch_size))
}

fn build_engine(app: &AppConfig, ledger: Arc<RevisionLedger>) -> Result<SyncEngine> {
    let sync_config = app.to_sync_config()?;

    let client = EpidataClient::new(app.client_config()).context("failed to build Epidata client")?;
    tracing::debug!(base_url = client.base_url(), "epidata client ready");

    let objects_path = app.data_dir()?.join("objects.db");
    let store = SqliteObjectStore::open(&objects_path)
        .with_context(|| format!("failed to open object store: {}", objects_path.display()))?;

    let engine = SyncEngine::new(Arc::new(client), Arc::new(store), ledger, sync_config)?;
    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut app = config::load_config(cli.config.as_deref())?;
    app.apply_env(|name| std::env::var(name).ok());

    match cli.command {
        Command::Sync { dry_run } => {
            let ledger = Arc::new(open_ledger(&app, app.sync.max_batch_size)?);
            let engine = build_engine(&app, Arc::clone(&ledger))?;
            commands::sync::run(&engine, ledger.as_ref(), dry_run).await
        }
        Command::Plan => {
            let ledger = Arc::new(open_ledger(&app, app.sync.max_batch_size)?);
            let engine = build_engine(&app, ledger)?;
            commands::plan::run(&engine).await
        }
        Command::Revisions => {
            let ledger = open_ledger(&app, app.sync.max_batch_size)?;
            commands::revisions::run(&ledger)
        }
    }
}
