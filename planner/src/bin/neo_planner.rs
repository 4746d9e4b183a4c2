//! neo-planner process entry point.
//!
//! # Usage
//!
//! ```bash
//! neo-planner lifecycle [neo-planner.toml]   # ingest/select every cycle interval
//! neo-planner cycle     [neo-planner.toml]   # one lifecycle cycle
//! neo-planner schedule  [neo-planner.toml]   # plan tonight, write the schedule file
//! neo-planner ephem     [neo-planner.toml]   # export ephemerides of selected targets
//! ```
//!
//! Control lines (`lifecycle: Ping!`, `lifecycle: Cycle`, `lifecycle: Abort`)
//! are read from stdin while the daemon runs.
//!
//! # Exit codes
//!
//! - 0: success
//! - 1: fatal configuration or store failure
//! - 2: candidate feed unavailable
//! - 3: nothing observable tonight
//!
//! `RUST_LOG` sets the log level (default: info).

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use neo_planner::config::PlannerConfig;
use neo_planner::control::forward_lines;
use neo_planner::db::{CandidateRepository, RepositoryFactory};
use neo_planner::providers::{EphemerisProvider, MpcClient};
use neo_planner::scheduler::{Planner, SchedulerError};
use neo_planner::services::{
    EphemBatch, EphemBatchOptions, LifecycleError, LifecycleManager, LifecycleOptions,
    ObservabilityEngine,
};

const DEFAULT_CONFIG: &str = "neo-planner.toml";

const EXIT_FATAL: u8 = 1;
const EXIT_FEED_UNAVAILABLE: u8 = 2;
const EXIT_NOTHING_OBSERVABLE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("schedule");
    let config_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_CONFIG);

    match run(command, config_path).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<LifecycleError>() {
        return match err {
            LifecycleError::FeedUnavailable(_) => EXIT_FEED_UNAVAILABLE,
            LifecycleError::Night(_) => EXIT_NOTHING_OBSERVABLE,
            LifecycleError::Store(_) => EXIT_FATAL,
        };
    }
    if let Some(SchedulerError::Night(_)) = e.downcast_ref::<SchedulerError>() {
        return EXIT_NOTHING_OBSERVABLE;
    }
    EXIT_FATAL
}

async fn run(command: &str, config_path: &str) -> anyhow::Result<u8> {
    let config = PlannerConfig::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    let repo = RepositoryFactory::create(&config.database).context("opening candidate store")?;
    if !repo.health_check().await? {
        bail!("candidate store failed its health check");
    }

    match command {
        "lifecycle" => run_lifecycle(&config, repo).await,
        "cycle" => run_cycle(&config, repo).await,
        "schedule" => run_schedule(&config, repo).await,
        "ephem" => run_ephem(&config, repo).await,
        other => bail!("unknown command '{}'; expected lifecycle, cycle, schedule or ephem", other),
    }
}

fn client(config: &PlannerConfig) -> anyhow::Result<Arc<MpcClient>> {
    let client = MpcClient::new(&config.feed, config.ephemeris.timeout())
        .context("building MPC client")?;
    Ok(Arc::new(client))
}

fn lifecycle_manager(
    config: &PlannerConfig,
    repo: Arc<dyn CandidateRepository>,
) -> anyhow::Result<LifecycleManager> {
    let client = client(config)?;
    let engine = ObservabilityEngine::new(config.site()?, config.thresholds.altitude_limit)
        .with_ephemeris(client.clone(), config.ephemeris.cadence()?);
    Ok(LifecycleManager::new(
        repo,
        client.clone(),
        client,
        engine,
        LifecycleOptions::from_config(config),
    ))
}

async fn run_lifecycle(config: &PlannerConfig, repo: Arc<dyn CandidateRepository>) -> anyhow::Result<u8> {
    let manager = lifecycle_manager(config, repo)?;
    let name = config.lifecycle.control_name.clone();

    let (control_tx, control_rx) = mpsc::channel(16);
    let (reply_tx, mut reply_rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if let Err(e) = forward_lines(BufReader::new(tokio::io::stdin()), control_tx).await {
            log::warn!("Control input closed: {}", e);
        }
    });
    tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("{}", reply);
        }
    });

    info!("Lifecycle daemon '{}' started", name);
    manager
        .run_daemon(&name, config.cycle_interval(), control_rx, reply_tx)
        .await?;
    Ok(0)
}

async fn run_cycle(config: &PlannerConfig, repo: Arc<dyn CandidateRepository>) -> anyhow::Result<u8> {
    let manager = lifecycle_manager(config, repo)?;
    let report = manager.run_cycle(Utc::now()).await?;
    info!(
        "Cycle done: {} fetched, {} inserted, {} removed, {} selected",
        report.ingest.fetched, report.ingest.inserted, report.ingest.removed, report.selection.selected
    );
    Ok(0)
}

async fn run_schedule(config: &PlannerConfig, repo: Arc<dyn CandidateRepository>) -> anyhow::Result<u8> {
    let provider: Arc<dyn EphemerisProvider> = client(config)?;
    let planner = Planner::from_config(repo, config)?
        .with_ephemeris(provider, config.ephemeris.cadence()?);
    let outcome = planner.plan_night(Utc::now()).await?;

    let path = &config.scheduler.output_path;
    tokio::fs::write(path, &outcome.text)
        .await
        .with_context(|| format!("writing schedule to {}", path.display()))?;
    info!("Schedule written to {}", path.display());

    if outcome.is_empty() {
        return Ok(EXIT_NOTHING_OBSERVABLE);
    }
    Ok(0)
}

async fn run_ephem(config: &PlannerConfig, repo: Arc<dyn CandidateRepository>) -> anyhow::Result<u8> {
    let provider: Arc<dyn EphemerisProvider> = client(config)?;
    let batch = EphemBatch::new(repo, provider, EphemBatchOptions::from_config(config)?);
    let report = batch.run(Utc::now()).await?;
    info!(
        "Exported {} ephemerides ({} unavailable)",
        report.written.len(),
        report.failed
    );
    Ok(0)
}
