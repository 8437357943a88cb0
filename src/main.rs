mod access;
mod api;
mod config;
mod db;
mod error;
mod gate;
mod scan;
mod state;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::access::{AccessPolicy, AccessResolver, HttpAccessOracle};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, StoreBackend};
use crate::db::SqlitePickStore;
use crate::error::Result;
use crate::gate::RedactionGate;
use crate::scan::AnthropicSlipReader;
use crate::state::{MemoryPickStore, PickStore};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Pick store ---
    let store: Arc<dyn PickStore> = match cfg.store_backend {
        StoreBackend::Memory => {
            warn!("STORE_BACKEND=memory: picks are lost on restart");
            MemoryPickStore::new(cfg.feed.mode)
        }
        StoreBackend::Sqlite => {
            let store = SqlitePickStore::connect(&cfg.db_path, cfg.feed.mode).await?;
            info!("Database ready at {}", cfg.db_path);
            store
        }
    };

    // --- Access resolver ---
    let health = Arc::new(HealthState::new());
    let access_latency = Arc::new(LatencyStats::new());
    let oracle = HttpAccessOracle::new(&cfg)?;
    let policy = AccessPolicy::from_config(&cfg);
    if policy.premium_products.is_empty() {
        warn!("No premium products configured: only admins will see unmasked picks");
    }
    if cfg.admin_secret.is_some() && policy.admin_secret.is_none() {
        warn!("ADMIN_SECRET is ignored outside the singleton feed");
    }
    info!(
        company_id = %policy.company_id,
        premium_products = policy.premium_products.len(),
        tiers = policy.tier_products.len(),
        timeout_ms = policy.call_timeout.as_millis() as u64,
        "Access policy loaded"
    );
    let resolver = AccessResolver::new(
        Arc::new(oracle),
        policy,
        Arc::clone(&health),
        Arc::clone(&access_latency),
    );

    // --- Slip reader ---
    let reader = AnthropicSlipReader::new(&cfg)?;
    if cfg.slip_reader_api_key.is_none() {
        warn!("ANTHROPIC_API_KEY not set: /scan will answer 500");
    }

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        resolver: Arc::new(resolver),
        gate: RedactionGate::new(cfg.feed.sentinels.clone()),
        reader: Arc::new(reader),
        feed: cfg.feed.clone(),
        health,
        access_latency,
        scan_latency: Arc::new(LatencyStats::new()),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        feed_mode = %cfg.feed.mode,
        store = %cfg.store_backend,
        "HTTP API listening on {bind_addr}"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
