//! Haruki Event Tracker
//!
//! Per-region event-tracker daemon:
//! - cron-driven leaderboard snapshots from the upstream game-data API
//! - dictionary-encoded relational storage with change-only writes
//! - redis-backed delta state for restart survival

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use tracker_core::AppConfig;
use tracker_daemon::{system_clock, RegionTracker, TrackerScheduler};
use tracker_database::DatabaseEngine;
use tracker_kvcache::KvCache;
use tracker_telemetry::init_tracing_from_config;
use tracker_upstream::{RankingApi, SekaiApiClient};

/// Default configuration file, overridable via `HARUKI_TRACKER_CONFIG`.
const CONFIG_FILE: &str = "haruki-tracker-configs.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing_from_config(&config.backend.log_level);

    info!(
        "========================= Haruki Event Tracker {} =========================",
        env!("CARGO_PKG_VERSION")
    );

    config.validate().context("invalid configuration")?;

    // Key/value backing; disabled mode degrades to empty state per tick.
    let kv = if config.redis.enabled {
        KvCache::connect(&config.redis)
            .await
            .context("failed to connect to redis")?
    } else {
        warn!("redis is disabled in configuration");
        KvCache::disabled()
    };

    let api: Arc<dyn RankingApi> = Arc::new(
        SekaiApiClient::new(&config.sekai_api).context("failed to build upstream client")?,
    );

    let mut scheduler = TrackerScheduler::new()
        .await
        .context("failed to create scheduler")?;

    let mut engines = Vec::new();
    for region in config.enabled_regions() {
        let server = &config.servers[&region];
        info!(region = %region, "initializing region");

        let engine = Arc::new(
            DatabaseEngine::connect(region, &server.database)
                .await
                .with_context(|| format!("failed to create database engine for {region}"))?,
        );
        engine
            .ping()
            .await
            .with_context(|| format!("database for {region} is unreachable"))?;

        let mut tracker = RegionTracker::new(
            region,
            &server.master_data_dir,
            engine.clone(),
            kv.clone(),
            api.clone(),
            system_clock(),
        );
        if let Err(e) = tracker.init().await {
            warn!(region = %region, error = %e, "tracker init failed, will retry on first run");
        }

        scheduler
            .add_region(region, &server.cron_expression(), tracker)
            .await
            .with_context(|| format!("failed to register cron job for {region}"))?;
        engines.push(engine);
    }

    if engines.is_empty() {
        warn!("no regions enabled; the daemon will idle");
    }

    scheduler.start().await.context("failed to start scheduler")?;
    info!("Haruki event tracker started");

    shutdown_signal().await;
    info!("Shutting down...");

    if let Err(e) = scheduler.shutdown().await {
        error!("Failed to shutdown scheduler: {e}");
    }
    for engine in &engines {
        engine.close().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from the YAML file plus environment overrides.
fn load_config() -> Result<AppConfig> {
    let path = std::env::var("HARUKI_TRACKER_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());

    let config = config::Config::builder()
        .add_source(config::Config::try_from(&AppConfig::default())?)
        .add_source(config::File::with_name(&path).format(config::FileFormat::Yaml))
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("HARUKI")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to load configuration from {path}"))?;

    config
        .try_deserialize()
        .context("failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
