pub mod routeros;

pub use routeros::{RouterOsClient, RouterOsConnector};

use crate::config::RouterConfig;
use crate::domain::{Domain, DomainSet};
use crate::error::RouterApiError;
use std::net::IpAddr;

/// A row of the router's static DNS table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDnsEntry {
    pub domain: Domain,
    /// `None` for entries that do not resolve to an address (CNAME, FWD, ...).
    pub address: Option<IpAddr>,
}

/// The remote calls reconciliation needs from a router.
#[async_trait::async_trait]
pub trait RouterApi: Send {
    /// Domains currently held in the router's DNS cache.
    async fn list_dns_cache(&mut self) -> Result<DomainSet, RouterApiError>;

    async fn list_static_entries(&mut self) -> Result<Vec<StaticDnsEntry>, RouterApiError>;

    async fn add_static_entry(
        &mut self,
        domain: &Domain,
        ip: IpAddr,
        comment: &str,
    ) -> Result<(), RouterApiError>;

    async fn flush_dns_cache(&mut self) -> Result<(), RouterApiError>;
}

/// Produces a client scoped to a single router's cycle.
#[async_trait::async_trait]
pub trait RouterConnector: Send + Sync {
    async fn connect(&self, router: &RouterConfig) -> Result<Box<dyn RouterApi>, RouterApiError>;
}
