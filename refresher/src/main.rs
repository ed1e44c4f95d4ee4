//! Ratekeeper Binary
//!
//! Runs the rate refresh scheduler, or a single refresh from the command line.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper_fx::{FreshnessCache, MemoryCache, RefreshGate, UpstreamClient};
use ratekeeper_refresher::{Metrics, Orchestrator, RatesView, RefresherConfig, Scheduler};
use ratekeeper_store::{MemoryRateStore, PgRateStore, RateStore};

/// Ratekeeper CLI
#[derive(Parser, Debug)]
#[command(name = "ratekeeper")]
#[command(about = "Exchange rate refresh service")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Run one refresh and print the outcome
    Refresh {
        /// Bypass the minimum refresh interval
        #[arg(long)]
        force: bool,
    },
    /// Print the stored rates
    Rates,
    /// Print rate store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RefresherConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = open_store(&config).await?;
    let cache = FreshnessCache::new(Arc::new(MemoryCache::new()), config.cache.clone());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, store, cache).await,
        Command::Refresh { force } => {
            let orchestrator = build_orchestrator(&config, store, cache)?;
            let outcome = orchestrator.refresh(force).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.error_kind().is_some() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Rates => {
            let view = RatesView::new(store, cache);
            println!("{}", serde_json::to_string_pretty(&view.rates().await?)?);
            Ok(())
        }
        Command::Stats => {
            let view = RatesView::new(store, cache);
            println!("{}", serde_json::to_string_pretty(&view.stats().await?)?);
            Ok(())
        }
    }
}

async fn serve(
    config: RefresherConfig,
    store: Arc<dyn RateStore>,
    cache: FreshnessCache,
) -> anyhow::Result<()> {
    info!("Starting Ratekeeper");

    let orchestrator = Arc::new(build_orchestrator(&config, store, cache)?);
    let scheduler = Scheduler::new(orchestrator.clone(), config.scheduler.clone());
    scheduler.start();

    info!(
        min_refresh_interval_secs = config.min_refresh_interval.as_secs(),
        api_url = %config.upstream.api_base_url,
        "Ratekeeper running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await;

    info!(metrics = ?orchestrator.metrics().snapshot(), "Ratekeeper shutdown complete");
    Ok(())
}

fn build_orchestrator(
    config: &RefresherConfig,
    store: Arc<dyn RateStore>,
    cache: FreshnessCache,
) -> anyhow::Result<Orchestrator> {
    let source = UpstreamClient::new(config.upstream.clone())?;
    if !source.has_api_key() {
        warn!("RATES_API_KEY not set, refreshes will use built-in fallback rates");
    }

    Ok(Orchestrator::new(
        store,
        Arc::new(source),
        cache,
        RefreshGate::new(config.gate_interval()),
        Arc::new(Metrics::new()),
    ))
}

async fn open_store(config: &RefresherConfig) -> anyhow::Result<Arc<dyn RateStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgRateStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("Connected to rate store database");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, rates are kept in memory only");
            Ok(Arc::new(MemoryRateStore::new()))
        }
    }
}
