//! Per-router pipeline: observe → aggregate → plan → apply.

use crate::aggregate::{load_allowed, load_source_urls, Aggregator};
use crate::cache::ProviderSource;
use crate::config::RouterConfig;
use crate::domain::{Domain, DomainSet};
use crate::error::{ReconcileError, RouterApiError, SourceListReadError};
use crate::router::RouterApi;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What the router reports before any change is made.
#[derive(Debug, Default)]
pub struct Observation {
    pub dns_cache: DomainSet,
    /// Every domain with a static entry, whatever it points at.
    pub already_blocked: DomainSet,
    /// Static entries that point somewhere other than the sinkhole.
    pub redirected_elsewhere: usize,
}

/// Outcome of one successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub router: String,
    /// Domains seen in the router's DNS cache.
    pub observed: usize,
    pub already_blocked: usize,
    pub denied: usize,
    /// Domains pinned to the sinkhole during this run, sorted.
    pub blocked: Vec<Domain>,
    pub flushed: bool,
    pub warnings: Vec<String>,
}

/// Domains that were seen by the router, are denied, are not allowed, and
/// have no static entry yet.
pub fn plan_blocks(
    dns_cache: &DomainSet,
    denied: &DomainSet,
    allowed: &DomainSet,
    already_blocked: &DomainSet,
) -> Vec<Domain> {
    let mut to_block: Vec<Domain> = dns_cache
        .iter()
        .filter(|d| denied.contains(*d))
        .filter(|d| !allowed.contains(*d) && !already_blocked.contains(*d))
        .cloned()
        .collect();
    to_block.sort();
    to_block
}

pub async fn observe(
    client: &mut dyn RouterApi,
    sinkhole: IpAddr,
) -> Result<Observation, RouterApiError> {
    let dns_cache = client.list_dns_cache().await?;
    let mut observation = Observation {
        dns_cache,
        ..Observation::default()
    };
    for entry in client.list_static_entries().await? {
        if entry.address != Some(sinkhole) {
            debug!("Static entry {} points at {:?}, leaving it", entry.domain, entry.address);
            observation.redirected_elsewhere += 1;
        }
        observation.already_blocked.insert(entry.domain);
    }
    Ok(observation)
}

/// Adds one static entry per domain, then flushes the cache once.
///
/// Returns whether a flush was issued.
pub async fn apply(
    client: &mut dyn RouterApi,
    to_block: &[Domain],
    router: &RouterConfig,
) -> Result<bool, RouterApiError> {
    if to_block.is_empty() {
        return Ok(false);
    }
    for domain in to_block {
        client
            .add_static_entry(domain, router.ip_to_redirect, &router.comment)
            .await?;
        info!("[{}] blocked: {}", router.name, domain);
    }
    client.flush_dns_cache().await?;
    debug!("[{}] DNS cache flushed", router.name);
    Ok(true)
}

/// Cache file for a provider listed in a sources file.
///
/// The readable stem is lossy, so a hash of the full URL keeps distinct URLs
/// in distinct files.
pub fn cache_path_for(cache_dir: &Path, url: &str) -> PathBuf {
    let stem: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .take(96)
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let mut hasher = FxHasher::default();
    hasher.write(url.as_bytes());
    cache_dir.join(format!("{}-{:016x}.json", stem, hasher.finish()))
}

/// Inline sources plus any listed in the router's sources file.
pub async fn resolve_sources(
    router: &RouterConfig,
) -> Result<Vec<ProviderSource>, SourceListReadError> {
    let mut sources = router.sources.clone();
    if let Some(path) = &router.sources_file {
        for url in load_source_urls(path).await? {
            if sources.iter().any(|s| s.url == url) {
                continue;
            }
            let cache_path = cache_path_for(&router.cache_dir, &url);
            sources.push(ProviderSource { url, cache_path });
        }
    }
    Ok(sources)
}

pub struct Reconciler {
    aggregator: Arc<Aggregator>,
}

impl Reconciler {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    pub async fn reconcile(
        &self,
        router: &RouterConfig,
        client: &mut dyn RouterApi,
    ) -> Result<ReconcileResult, ReconcileError> {
        let observation = observe(client, router.ip_to_redirect).await?;
        info!(
            "[{}] {} domains in DNS cache, {} static entries ({} not pointing at {})",
            router.name,
            observation.dns_cache.len(),
            observation.already_blocked.len(),
            observation.redirected_elsewhere,
            router.ip_to_redirect
        );

        let allowed = load_allowed(&router.allowed_domains_file).await?;
        let sources = resolve_sources(router).await?;
        let aggregated = self
            .aggregator
            .aggregate(&sources, router.max_age, &allowed)
            .await;

        let to_block = plan_blocks(
            &observation.dns_cache,
            &aggregated.denied,
            &allowed,
            &observation.already_blocked,
        );
        info!("[{}] {} new domains to block", router.name, to_block.len());

        let flushed = apply(client, &to_block, router).await?;

        Ok(ReconcileResult {
            router: router.name.clone(),
            observed: observation.dns_cache.len(),
            already_blocked: observation.already_blocked.len(),
            denied: aggregated.denied.len(),
            blocked: to_block,
            flushed,
            warnings: aggregated.warnings,
        })
    }
}
