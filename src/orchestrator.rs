use crate::config::RouterConfig;
use crate::error::ReconcileError;
use crate::reconcile::{ReconcileResult, Reconciler};
use crate::router::RouterConnector;
use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct RouterOutcome {
    pub router: String,
    pub result: Result<ReconcileResult, ReconcileError>,
}

/// Per-router outcomes of one run, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<RouterOutcome>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(r) => {
                    info!(
                        "[{}] ok: {} observed, {} newly blocked, {} warnings",
                        outcome.router,
                        r.observed,
                        r.blocked.len(),
                        r.warnings.len()
                    );
                    for w in &r.warnings {
                        warn!("[{}] {}", outcome.router, w);
                    }
                }
                Err(e) => error!("[{}] failed: {}", outcome.router, e),
            }
        }
        info!(
            "Reconciled {} of {} routers",
            self.outcomes.len() - self.failed(),
            self.outcomes.len()
        );
    }
}

pub struct Orchestrator {
    connector: Arc<dyn RouterConnector>,
    reconciler: Arc<Reconciler>,
    max_parallel: usize,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn RouterConnector>,
        reconciler: Arc<Reconciler>,
        max_parallel: usize,
    ) -> Self {
        Self {
            connector,
            reconciler,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Reconciles every router. A failing router never stops the others, and
    /// neither does one whose task panics.
    pub async fn run(&self, routers: &[RouterConfig]) -> RunReport {
        let tasks = routers.iter().map(|router| {
            let connector = self.connector.clone();
            let reconciler = self.reconciler.clone();
            let router = router.clone();
            async move {
                info!("Processing router {} ({})", router.name, router.host);
                let name = router.name.clone();
                let handle =
                    tokio::spawn(async move { run_one(&*connector, &reconciler, &router).await });
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(ReconcileError::Aborted(e.to_string())),
                };
                RouterOutcome { router: name, result }
            }
        });

        let outcomes = stream::iter(tasks)
            .buffered(self.max_parallel)
            .collect()
            .await;
        RunReport { outcomes }
    }
}

async fn run_one(
    connector: &dyn RouterConnector,
    reconciler: &Reconciler,
    router: &RouterConfig,
) -> Result<ReconcileResult, ReconcileError> {
    // The client lives only for this router's cycle.
    let mut client = connector.connect(router).await?;
    reconciler.reconcile(router, &mut *client).await
}
