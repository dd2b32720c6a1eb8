use anyhow::Result;
use std::process::ExitCode;
use tracing::{error, info};

use routeros_adblock::config::{Config, DEFAULT_CONFIG_PATH};
use routeros_adblock::init::{build_orchestrator, setup_logging};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1. Load Config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).await?;

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting routeros-adblock with {}", config_path);

    // 3. Resolve routers
    let routers = match config.router_configs() {
        Ok(routers) => routers,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    if routers.is_empty() {
        error!("No routers configured in {}", config_path);
        return Ok(ExitCode::FAILURE);
    }

    // 4. Reconcile
    let orchestrator = build_orchestrator(&config)?;
    let report = orchestrator.run(&routers).await;
    report.log_summary();

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
