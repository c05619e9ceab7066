//! revsweepd: the revision cleanup daemon.
//!
//! Assembles the embedded state store, the cleanup engine, and the REST
//! API. One-shot subcommands run a cleanup, an orphan sweep, or record a
//! deployment without starting the server.
//!
//! # Usage
//!
//! ```text
//! revsweepd --config revsweep.toml serve --port 8080
//! revsweepd --config revsweep.toml cleanup --keep 5 --dry-run
//! revsweepd --config revsweep.toml record --revision rev-42 --us-version 1.459.0
//! ```
//!
//! The embedded store is locked by whichever process opens it first, so the
//! one-shot subcommands only work while `serve` is stopped. Against a running
//! daemon, use the HTTP routes instead (`POST /deployments` to record).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use revsweep_cleanup::{CleanupEngine, CleanupOptions, EngineConfig};
use revsweep_core::config::LogFormat;
use revsweep_core::{DeploymentEntry, KeepCount, Settings};
use revsweep_state::StateStore;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "revsweepd", about = "Deployment revision retention and cleanup daemon")]
struct Cli {
    /// Path to revsweep.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the embedded state store.
    #[arg(long, global = true, default_value = "/var/lib/revsweep")]
    data_dir: PathBuf,

    /// Overrides `service.service_id`.
    #[arg(long, global = true)]
    service_id: Option<String>,

    /// Overrides `storage.bucket`.
    #[arg(long, global = true)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the cleanup API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Run one cleanup and print the report as JSON.
    Cleanup {
        /// Recent deployments to keep. Defaults to `cleanup.default_keep`.
        #[arg(long)]
        keep: Option<i64>,

        /// Report what would be removed without removing it.
        #[arg(long)]
        dry_run: bool,

        /// Also delete platform revisions that are neither retained nor routed.
        #[arg(long)]
        delete_revisions: bool,
    },

    /// Delete metadata of revisions that no longer exist on the platform.
    SweepOrphans,

    /// Record a successful deployment: append it to the manifest and write
    /// its metadata files. Offline only; a running server answers
    /// `POST /deployments` instead.
    Record {
        #[arg(long)]
        revision: String,

        #[arg(long, default_value = "")]
        us_version: String,

        #[arg(long, default_value = "")]
        uk_version: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    init_tracing(settings.log_format)?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating {}", cli.data_dir.display()))?;
    let db_path = cli.data_dir.join("revsweep.redb");
    let store = StateStore::open(&db_path).with_context(|| {
        format!(
            "opening {}; if `revsweepd serve` is running, use its HTTP API instead",
            db_path.display()
        )
    })?;
    info!(path = ?db_path, "state store opened");

    let engine = build_engine(&settings, &store)?;

    match cli.command {
        Command::Serve { port } => serve(port, engine).await,
        Command::Cleanup {
            keep,
            dry_run,
            delete_revisions,
        } => {
            let engine = require(engine)?;
            let keep = match keep {
                Some(n) => KeepCount::new(n)?,
                None => engine.default_keep(),
            };
            let options = CleanupOptions {
                dry_run,
                delete_revisions,
            };
            let report = tokio::time::timeout(engine.timeout(), engine.cleanup(keep, options))
                .await
                .context("cleanup timed out")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::SweepOrphans => {
            let engine = require(engine)?;
            let report = tokio::time::timeout(engine.timeout(), engine.sweep_orphans())
                .await
                .context("orphan sweep timed out")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Record {
            revision,
            us_version,
            uk_version,
        } => {
            let engine = require(engine)?;
            let entry = DeploymentEntry::new(&revision, &us_version, &uk_version, chrono::Utc::now())?;
            let recorded = engine.record(entry).await?;
            println!("{}", serde_json::to_string_pretty(&recorded)?);
            Ok(())
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(service_id) = &cli.service_id {
        settings.service.service_id = service_id.clone();
    }
    if let Some(bucket) = &cli.bucket {
        settings.storage.bucket = bucket.clone();
    }
    Ok(settings)
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,revsweepd=debug,revsweep=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// The engine, or `None` when service or bucket is not configured.
fn build_engine(
    settings: &Settings,
    store: &StateStore,
) -> anyhow::Result<Option<Arc<CleanupEngine>>> {
    if !settings.cleanup_enabled() {
        warn!("service.service_id or storage.bucket not set, cleanup disabled");
        return Ok(None);
    }
    let config = EngineConfig::from_settings(settings)?;
    let engine = CleanupEngine::new(
        Arc::new(store.bucket(&settings.storage.bucket)),
        Arc::new(store.clone()),
        config,
    );
    info!(
        service = %settings.service.service_id,
        bucket = %settings.storage.bucket,
        default_keep = settings.cleanup.default_keep,
        "cleanup engine ready"
    );
    Ok(Some(Arc::new(engine)))
}

fn require(engine: Option<Arc<CleanupEngine>>) -> anyhow::Result<Arc<CleanupEngine>> {
    engine.context("cleanup not configured; set service.service_id and storage.bucket")
}

async fn serve(port: u16, engine: Option<Arc<CleanupEngine>>) -> anyhow::Result<()> {
    let router = revsweep_api::build_router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("revsweep daemon stopped");
    Ok(())
}
