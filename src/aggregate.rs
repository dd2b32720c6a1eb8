use crate::cache::{CachedList, ListCache, ProviderSource};
use crate::domain::{parse_list, DomainSet};
use crate::error::{AllowListReadError, SourceListReadError};
use futures::{stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Merged denied-domain set for one cycle.
#[derive(Debug, Default)]
pub struct Aggregated {
    pub denied: DomainSet,
    pub warnings: Vec<String>,
}

pub struct Aggregator {
    cache: Arc<ListCache>,
    concurrent_downloads: usize,
}

impl Aggregator {
    pub fn new(cache: Arc<ListCache>, concurrent_downloads: usize) -> Self {
        Self {
            cache,
            concurrent_downloads: concurrent_downloads.max(1),
        }
    }

    /// Unions every source's list and removes the allowed domains.
    pub async fn aggregate(
        &self,
        sources: &[ProviderSource],
        max_age: Duration,
        allowed: &DomainSet,
    ) -> Aggregated {
        let tasks: Vec<_> = sources
            .iter()
            .map(|source| {
                let cache = self.cache.clone();
                async move { cache.get(source, max_age).await }
            })
            .collect();

        let results: Vec<CachedList> = stream::iter(tasks)
            .buffer_unordered(self.concurrent_downloads)
            .collect()
            .await;

        let mut aggregated = Aggregated::default();
        let mut total_count = 0;
        for list in results {
            total_count += list.domains.len();
            aggregated.denied.extend(list.domains);
            aggregated.warnings.extend(list.warnings);
        }

        let before_allow = aggregated.denied.len();
        aggregated.denied.retain(|d| !allowed.contains(d));

        info!(
            "Aggregated {} denied domains from {} sources ({} raw, {} allowed)",
            aggregated.denied.len(),
            sources.len(),
            total_count,
            before_allow - aggregated.denied.len()
        );
        aggregated
    }
}

/// Reads the allow-list. Failures are not recoverable for the cycle.
pub async fn load_allowed(path: &Path) -> Result<DomainSet, AllowListReadError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| AllowListReadError {
            path: path.to_path_buf(),
            source,
        })?;

    let parsed = parse_list(text.lines());
    if parsed.invalid > 0 {
        warn!(
            "Allow-list {} has {} malformed entries",
            path.display(),
            parsed.invalid
        );
    }
    Ok(parsed.domains)
}

/// Reads a file of provider URLs, one per line, `#` comments allowed.
pub async fn load_source_urls(path: &Path) -> Result<Vec<String>, SourceListReadError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| SourceListReadError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
