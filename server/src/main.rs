//! wardend: governed execution daemon.
//!
//! Usage:
//!   wardend serve --config warden.toml
//!   wardend --mode live --base-dir /srv/warden serve
//!   wardend verify --ledger logs/warden-audit.log
//!   wardend history <execution-id>
//!
//! Every flag can also be set through its `WARDEN_*` environment variable;
//! a `.env` file in the working directory is loaded first.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use warden_audit::FileLedger;
use warden_core::traits::AuditLedger;
use warden_server::{ConfigOverrides, Server, WardenConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Warden: audited, single-flight execution of document extraction.
#[derive(Parser)]
#[command(
    name = "wardend",
    version,
    about = "Governed execution daemon with a hash-chained audit ledger"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "WARDEN_LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the ledger, recover interrupted work and serve HTTP.
    Serve,
    /// Verify the ledger hash chain and exit.
    Verify,
    /// Print every ledger entry of one execution.
    History {
        /// Execution id returned by /api/process or /api/finalize.
        execution_id: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = WardenConfig::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    let config = config.absolutize()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Verify => verify(&config),
        Command::History { execution_id } => history(&config, &execution_id),
    }
}

fn init_tracing(json: bool) {
    // RUST_LOG overrides the default level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn serve(config: WardenConfig) -> anyhow::Result<()> {
    let server = Server::new(config).context("startup failed")?;
    server.run().await?;
    Ok(())
}

fn verify(config: &WardenConfig) -> anyhow::Result<()> {
    let path = config.ledger();
    let ledger = FileLedger::open(&path)?;
    let entries = ledger
        .verify_chain()
        .with_context(|| format!("ledger '{}' failed verification", path.display()))?;
    println!("{}: {} entries verified", path.display(), entries);
    Ok(())
}

fn history(config: &WardenConfig, execution_id: &str) -> anyhow::Result<()> {
    let ledger = FileLedger::open(config.ledger())?;
    let records = ledger.all_for_execution(execution_id)?;
    if records.is_empty() {
        bail!("no ledger entries for execution {execution_id}");
    }
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
