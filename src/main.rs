//! News digest service entrypoint.
//! `serve` runs the daily scheduler plus the HTTP surface; `once` runs the
//! pipeline a single time and exits with its outcome.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use news_digest::api::{self, AppState};
use news_digest::metrics::Metrics;
use news_digest::orchestrator::{spawn_signal_loop, Orchestrator};
use news_digest::scheduler::{compute_next_fire, Scheduler};
use news_digest::store::MemoryStore;
use news_digest::{Category, DigestConfig};

#[derive(Parser)]
#[command(name = "news-digest")]
#[command(about = "Fetch, summarize, enhance and deliver a daily news digest", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config (defaults to config/digest.toml)
    #[arg(long, global = true, env = "DIGEST_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and HTTP server until Ctrl+C
    Serve,
    /// Run the pipeline once and exit (code 1 if nothing was processed)
    Once {
        /// Restrict the run to one category
        #[arg(long)]
        category: Option<Category>,
    },
    /// Print the next scheduled fire time
    NextFire,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real env vars win.
    let _ = dotenvy::dotenv();
    news_digest::init_tracing();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(p) => DigestConfig::load_from(p)?,
        None => DigestConfig::load_default()?,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::NextFire => {
            let next = compute_next_fire(&cfg.schedule.fire_time, &Local::now());
            println!("{}", next.format("%Y-%m-%d %H:%M:%S %Z"));
            Ok(())
        }
        Commands::Once { category } => {
            cfg.resolve_secrets();
            let orchestrator = build_orchestrator(&cfg)?;
            let cancel = CancellationToken::new();
            let categories = match category {
                Some(c) => vec![c],
                None => orchestrator.categories().to_vec(),
            };

            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    tracing::warn!(target: "pipeline", "interrupt received; cancelling run");
                    ctrl_c_cancel.cancel();
                }
            });

            let report = orchestrator
                .run_categories(&categories, &cancel)
                .await
                .context("run guard unexpectedly held")?;
            println!("{}", report.render_table());
            std::process::exit(report.outcome.exit_code());
        }
        Commands::Serve => {
            cfg.resolve_secrets();
            serve(cfg).await
        }
    }
}

fn build_orchestrator(cfg: &DigestConfig) -> Result<Arc<Orchestrator>> {
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &cfg.knowledge.seed_path {
        if path.exists() {
            let (k, q) = store
                .seed_from_path(path)
                .with_context(|| format!("seeding knowledge from {}", path.display()))?;
            tracing::info!(knowledge = k, questions = q, path = %path.display(), "knowledge seeded");
        } else {
            tracing::warn!(path = %path.display(), "knowledge seed file not found; enhancement disabled");
        }
    }
    Ok(Arc::new(Orchestrator::from_config(cfg, store)?))
}

async fn serve(cfg: DigestConfig) -> Result<()> {
    let orchestrator = build_orchestrator(&cfg)?;
    let metrics = Metrics::install()?;
    let cancel = CancellationToken::new();

    let (scheduler, signals) = Scheduler::start(cfg.schedule.fire_time.clone(), &cancel);
    let runner = spawn_signal_loop(orchestrator.clone(), signals, cancel.clone());

    let state = AppState {
        orchestrator,
        cancel: cancel.clone(),
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "http server listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("http server")?;

    scheduler.stop().await;
    if let Err(e) = runner.await {
        tracing::warn!(error = ?e, "signal loop ended abnormally");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
