//! SeedCheck - Deliverability testing server entry point

use anyhow::Result;
use seedcheck_api::AppState;
use seedcheck_common::config::Config;
use seedcheck_core::{
    DnsValidator, MemoryTestStore, PlacementChecker, ProbeDispatcher, SpamChecker, TestPipeline,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config);

    info!("Starting SeedCheck server...");

    if config.seed_mailboxes.is_empty() {
        warn!("No seed mailboxes configured; live test runs will fail at dispatch");
    }

    let store = Arc::new(MemoryTestStore::new());

    let dispatcher = ProbeDispatcher::new(config.relay.clone(), &config.seed_mailboxes);
    let placement = PlacementChecker::new(
        config.seed_mailboxes.clone(),
        config.pipeline.provider_timeout_secs,
    );
    let spam = SpamChecker::new(config.spam_check.clone());
    let dns = DnsValidator::new(config.dns.timeout_secs);

    let pipeline = Arc::new(TestPipeline::new(
        store.clone(),
        dispatcher,
        placement,
        spam,
        dns,
        config.pipeline.clone(),
    ));

    let state = Arc::new(AppState {
        store,
        pipeline,
        validator: Arc::new(DnsValidator::new(config.dns.timeout_secs)),
    });

    let app = seedcheck_api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Starting API server on {}", config.server.bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("SeedCheck server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();

    info!("SeedCheck server shutdown complete");

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},seedcheck=debug", config.logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
