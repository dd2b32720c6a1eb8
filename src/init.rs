//! Initialization helpers for the application startup.

use crate::aggregate::Aggregator;
use crate::cache::{FileCacheStore, ListCache};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::orchestrator::Orchestrator;
use crate::reconcile::Reconciler;
use crate::router::RouterOsConnector;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wires the HTTP fetcher, on-disk cache and RouterOS connector together.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let fetcher = HttpFetcher::new(&config.updates.user_agent, config.updates.fetch_timeout)
        .context("Failed to build HTTP client")?;
    let cache = ListCache::new(Arc::new(FileCacheStore::new()), Arc::new(fetcher));
    let aggregator = Aggregator::new(Arc::new(cache), config.updates.concurrent_downloads);

    info!(
        "Using {} concurrent downloads, {} routers in parallel",
        config.updates.concurrent_downloads, config.updates.max_parallel_routers
    );

    Ok(Orchestrator::new(
        Arc::new(RouterOsConnector),
        Arc::new(Reconciler::new(Arc::new(aggregator))),
        config.updates.max_parallel_routers,
    ))
}
