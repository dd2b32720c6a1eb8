//! Freshness-gated caching of provider block-lists.

mod store;

pub use store::{CacheStore, FileCacheStore, MemoryCacheStore, StoreLock};

use crate::domain::{parse_list, DomainSet};
use crate::fetch::ListFetcher;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// One denied-domain list and where its last fetch is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderSource {
    pub url: String,
    pub cache_path: PathBuf,
}

/// Persisted state for a [`ProviderSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Provider the domains were fetched from.
    pub url: String,
    /// Unix seconds of the fetch that produced `domains`.
    pub fetched_at: u64,
    pub domains: DomainSet,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, domains: DomainSet, fetched_at: SystemTime) -> Self {
        Self {
            url: url.into(),
            fetched_at: unix_secs(fetched_at),
            domains,
        }
    }

    pub fn age(&self, now: SystemTime) -> Duration {
        let fetched = UNIX_EPOCH + Duration::from_secs(self.fetched_at);
        // A timestamp from the future counts as brand new.
        now.duration_since(fetched).unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: SystemTime, max_age: Duration) -> bool {
        self.age(now) < max_age
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A source's domains together with anything worth surfacing to the operator.
#[derive(Debug, Default)]
pub struct CachedList {
    pub domains: DomainSet,
    pub warnings: Vec<String>,
}

pub struct ListCache {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn ListFetcher>,
    // One lock per cache path: routers sharing a source must not interleave
    // a read with another cycle's write. The store's lock extends this to
    // other processes.
    locks: Mutex<FxHashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ListCache {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn ListFetcher>) -> Self {
        Self {
            store,
            fetcher,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    fn lock_for(&self, source: &ProviderSource) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(source.cache_path.clone()).or_default().clone()
    }

    /// Returns the source's domains, fetching only when the persisted copy is
    /// missing, unreadable or at least `max_age` old.
    pub async fn get(&self, source: &ProviderSource, max_age: Duration) -> CachedList {
        let lock = self.lock_for(source);
        let _guard = lock.lock().await;
        let _store_lock = match self.store.lock(&source.cache_path).await {
            Ok(held) => Some(held),
            Err(e) => {
                warn!("Could not lock {}: {}", source.cache_path.display(), e);
                None
            }
        };

        let previous = match self.store.load(&source.cache_path).await {
            Ok(Some(entry)) if entry.url != source.url => {
                info!(
                    "Cache file {} holds {:?}, not {}; refetching",
                    source.cache_path.display(),
                    entry.url,
                    source.url
                );
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring cached copy of {}: {}", source.url, e);
                None
            }
        };

        let now = SystemTime::now();
        if let Some(entry) = &previous {
            if entry.is_fresh(now, max_age) {
                info!(
                    "Using cached list for {} ({} domains, {}s old)",
                    source.url,
                    entry.domains.len(),
                    entry.age(now).as_secs()
                );
                return CachedList {
                    domains: entry.domains.clone(),
                    warnings: Vec::new(),
                };
            }
        }

        let mut warnings = Vec::new();
        let lines = match self.fetcher.fetch_lines(&source.url).await {
            Ok(lines) => lines,
            Err(e) => {
                let domains = match previous {
                    Some(entry) => {
                        let msg = format!(
                            "fetch failed ({}); using stale cache from {}s ago",
                            e,
                            entry.age(now).as_secs()
                        );
                        warn!("{}: {}", source.url, msg);
                        warnings.push(format!("{}: {}", source.url, msg));
                        entry.domains
                    }
                    None => {
                        let msg = format!("fetch failed ({}); no cached copy to fall back on", e);
                        warn!("{}: {}", source.url, msg);
                        warnings.push(format!("{}: {}", source.url, msg));
                        DomainSet::default()
                    }
                };
                return CachedList { domains, warnings };
            }
        };

        let parsed = parse_list(lines.iter().map(String::as_str));
        if parsed.invalid > 0 {
            let msg = format!("{}: skipped {} malformed entries", source.url, parsed.invalid);
            warn!("{}", msg);
            warnings.push(msg);
        }
        info!("Fetched {} domains from {}", parsed.domains.len(), source.url);

        let entry = CacheEntry::new(source.url.as_str(), parsed.domains, SystemTime::now());
        if let Err(e) = self.store.save(&source.cache_path, &entry).await {
            let msg = format!(
                "{}: could not persist cache to {}: {}",
                source.url,
                source.cache_path.display(),
                e
            );
            warn!("{}", msg);
            warnings.push(msg);
        }

        CachedList {
            domains: entry.domains,
            warnings,
        }
    }
}
