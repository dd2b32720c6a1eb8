//! Client for the RouterOS binary API (plain TCP, port 8728 by default).

mod client;
pub mod codec;

pub use client::RouterOsClient;

use super::{RouterApi, RouterConnector};
use crate::config::RouterConfig;
use crate::error::RouterApiError;

/// Opens one logged-in session per router.
#[derive(Debug, Default, Clone)]
pub struct RouterOsConnector;

#[async_trait::async_trait]
impl RouterConnector for RouterOsConnector {
    async fn connect(&self, router: &RouterConfig) -> Result<Box<dyn RouterApi>, RouterApiError> {
        let client = RouterOsClient::connect(
            &router.host,
            router.port,
            &router.username,
            &router.password,
            router.timeout,
        )
        .await?;
        Ok(Box::new(client))
    }
}
