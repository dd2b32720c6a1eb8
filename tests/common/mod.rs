#![allow(dead_code)]

use routeros_adblock::aggregate::Aggregator;
use routeros_adblock::cache::{ListCache, MemoryCacheStore, ProviderSource};
use routeros_adblock::config::RouterConfig;
use routeros_adblock::domain::{normalize, Domain, DomainSet};
use routeros_adblock::error::{ProviderFetchError, RouterApiError};
use routeros_adblock::fetch::ListFetcher;
use routeros_adblock::reconcile::Reconciler;
use routeros_adblock::router::{RouterApi, RouterConnector, StaticDnsEntry};
use rustc_hash::FxHashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SINKHOLE: &str = "0.0.0.0";

pub fn domain_set<'a>(raw: impl IntoIterator<Item = &'a str>) -> DomainSet {
    raw.into_iter().map(|d| normalize(d).unwrap()).collect()
}

/// Serves fixed bodies by URL; anything else is unreachable.
pub struct StaticFetcher {
    pub bodies: FxHashMap<String, String>,
}

#[async_trait::async_trait]
impl ListFetcher for StaticFetcher {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>, ProviderFetchError> {
        match self.bodies.get(url) {
            Some(body) => Ok(body.lines().map(str::to_string).collect()),
            None => Err(ProviderFetchError::Unavailable {
                url: url.to_string(),
                reason: "no route to host".to_string(),
            }),
        }
    }
}

/// Shared view of a fake router's tables and the calls made against it.
#[derive(Debug, Default)]
pub struct RouterState {
    pub dns_cache: DomainSet,
    pub static_entries: Vec<StaticDnsEntry>,
    pub adds: usize,
    pub flushes: usize,
    pub fail_listing: bool,
    pub panic_listing: bool,
}

#[derive(Clone, Default)]
pub struct FakeRouter {
    pub state: Arc<Mutex<RouterState>>,
}

impl FakeRouter {
    pub fn with_cache(dns_cache: DomainSet) -> Self {
        let router = Self::default();
        router.state.lock().unwrap().dns_cache = dns_cache;
        router
    }

    pub fn block_existing(&self, domain: Domain) {
        self.redirect_existing(domain, SINKHOLE.parse().unwrap());
    }

    pub fn redirect_existing(&self, domain: Domain, address: IpAddr) {
        self.state.lock().unwrap().static_entries.push(StaticDnsEntry {
            domain,
            address: Some(address),
        });
    }

    pub fn static_domains(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .static_entries
            .iter()
            .map(|e| e.domain.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn mutations(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.adds, state.flushes)
    }
}

#[async_trait::async_trait]
impl RouterApi for FakeRouter {
    async fn list_dns_cache(&mut self) -> Result<DomainSet, RouterApiError> {
        let state = self.state.lock().unwrap();
        if state.panic_listing {
            drop(state);
            panic!("router firmware returned garbage");
        }
        if state.fail_listing {
            return Err(RouterApiError::Fatal("session terminated".to_string()));
        }
        Ok(state.dns_cache.clone())
    }

    async fn list_static_entries(&mut self) -> Result<Vec<StaticDnsEntry>, RouterApiError> {
        Ok(self.state.lock().unwrap().static_entries.clone())
    }

    async fn add_static_entry(
        &mut self,
        domain: &Domain,
        ip: IpAddr,
        _comment: &str,
    ) -> Result<(), RouterApiError> {
        let mut state = self.state.lock().unwrap();
        if state.static_entries.iter().any(|e| &e.domain == domain) {
            return Err(RouterApiError::Trap {
                command: "/ip/dns/static/add".to_string(),
                message: "entry already exists".to_string(),
            });
        }
        state.adds += 1;
        state.static_entries.push(StaticDnsEntry {
            domain: domain.clone(),
            address: Some(ip),
        });
        Ok(())
    }

    async fn flush_dns_cache(&mut self) -> Result<(), RouterApiError> {
        self.state.lock().unwrap().flushes += 1;
        Ok(())
    }
}

/// Hands out fake routers by name; unknown names fail to connect.
#[derive(Default)]
pub struct FakeConnector {
    pub routers: FxHashMap<String, FakeRouter>,
}

#[async_trait::async_trait]
impl RouterConnector for FakeConnector {
    async fn connect(&self, router: &RouterConfig) -> Result<Box<dyn RouterApi>, RouterApiError> {
        match self.routers.get(&router.name) {
            Some(fake) => Ok(Box::new(fake.clone())),
            None => Err(RouterApiError::Connect {
                addr: format!("{}:{}", router.host, router.port),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            }),
        }
    }
}

pub const ADS_URL: &str = "https://lists.example/ads.txt";

pub fn reconciler_serving(body: &str) -> Reconciler {
    reconciler_serving_all(&[(ADS_URL, body)])
}

pub fn reconciler_serving_all(lists: &[(&str, &str)]) -> Reconciler {
    let bodies = lists
        .iter()
        .map(|(url, body)| (url.to_string(), body.to_string()))
        .collect();
    let cache = ListCache::new(
        Arc::new(MemoryCacheStore::new()),
        Arc::new(StaticFetcher { bodies }),
    );
    Reconciler::new(Arc::new(Aggregator::new(Arc::new(cache), 2)))
}

pub fn write_allowed(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("allowed.txt");
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn router_config(name: &str, allowed: PathBuf) -> RouterConfig {
    RouterConfig {
        name: name.to_string(),
        host: format!("{}.lan", name),
        port: 8728,
        username: "admin".to_string(),
        password: String::new(),
        ip_to_redirect: SINKHOLE.parse().unwrap(),
        allowed_domains_file: allowed,
        sources: vec![ProviderSource {
            url: ADS_URL.to_string(),
            cache_path: PathBuf::from("/cache/ads.json"),
        }],
        sources_file: None,
        cache_dir: PathBuf::from("/cache"),
        max_age: Duration::from_secs(3600),
        comment: "ADBlock".to_string(),
        timeout: Duration::from_secs(5),
    }
}
