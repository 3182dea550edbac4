/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Owns the record store and passes it to every component that needs it
/// - Wires the probe cycle into the supervised scheduler
/// - Runs the retention compactor next to the scheduler
/// - Serves the read operations and the on-demand check
pub mod retention;


pub use retention::{RetentionCompactor, RetentionPolicy};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, ServiceConfig};
use crate::database::{self, RecordStore};
use crate::monitoring::types::ProbeRecord;
use crate::monitoring::{CheckCycle, HealthCheckScheduler, ProbeCycle, ProbeExecutor, SchedulerSettings};
use crate::query::{self, ServiceUptime, StatusQuery};

/// Main orchestrator for the monitor
pub struct Orchestrator {
    config: Arc<Config>,
    cycle: Arc<ProbeCycle>,
    scheduler: HealthCheckScheduler,
    compactor: RetentionCompactor,
    query: StatusQuery,
    retention_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Validate `config`, open the record store (with retries) and wire all
    /// components. Nothing is started yet.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        info!("Opening record store at {}", config.database_path.display());
        let store = database::open_store(&config.database_path)
            .await
            .with_context(|| format!("failed to open record store {}", config.database_path.display()))?;

        Self::with_store(config, Arc::new(store))
    }

    /// Wire all components around an already opened store
    pub fn with_store(config: Config, store: Arc<dyn RecordStore>) -> Result<Self> {
        let executor = ProbeExecutor::new().context("failed to build HTTP client")?;
        Ok(Self::with_parts(config, store, executor))
    }

    pub fn with_parts(config: Config, store: Arc<dyn RecordStore>, executor: ProbeExecutor) -> Self {
        let config = Arc::new(config);

        let services: Arc<[ServiceConfig]> = config.services.iter().cloned().collect();
        let cycle = Arc::new(ProbeCycle::new(
            Arc::new(executor),
            Arc::clone(&store),
            services,
            config.probe_timeout(),
        ));

        let scheduler = HealthCheckScheduler::new(
            Arc::clone(&cycle) as Arc<dyn CheckCycle>,
            SchedulerSettings::from(&*config),
        );
        let compactor = RetentionCompactor::new(Arc::clone(&store), RetentionPolicy::from(&*config));
        let query = StatusQuery::new(store);

        Self { config, cycle, scheduler, compactor, query, retention_handle: Mutex::new(None) }
    }

    /// Start the scheduler and the retention compactor
    pub fn start(&self) {
        info!(
            services = self.config.services.len(),
            retention_days = self.config.retention_days,
            "Starting monitor"
        );
        self.scheduler.start();

        let mut handle = self.retention_handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = handle.replace(self.compactor.start_periodic_cleanup()) {
            previous.abort();
        }
    }

    /// Stop the scheduler and the retention compactor
    pub fn stop(&self) {
        self.scheduler.stop();
        if let Some(handle) = self.retention_handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    /// Stop, then wait up to `grace` for in-flight probes to persist their
    /// records. Returns `false` if some were still running at the deadline.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop();

        let pending = self.cycle.in_flight();
        if pending > 0 {
            info!(pending, "Waiting for in-flight checks to finish");
        }
        let drained = self.cycle.drain(grace).await;
        if !drained {
            warn!(pending = self.cycle.in_flight(), "Shutdown grace period elapsed with checks still running");
        }
        drained
    }

    /// Grace period for `shutdown`: long enough for a probe started just
    /// before the signal to hit its own timeout
    pub fn shutdown_grace(&self) -> Duration {
        self.config.probe_timeout() + Duration::from_secs(1)
    }

    /// Run one check cycle right now and return the fresh latest status
    pub async fn check_now(&self) -> Result<BTreeMap<String, ProbeRecord>> {
        info!("Manual health check triggered");
        self.cycle.run().await?;
        Ok(self.query.latest_status().await?)
    }

    pub async fn latest_status(&self) -> Result<BTreeMap<String, ProbeRecord>> {
        Ok(self.query.latest_status().await?)
    }

    pub async fn history(&self, service: &str, days: u32) -> Result<Vec<ProbeRecord>> {
        Ok(self.query.history(service, query::days(days)).await?)
    }

    pub async fn all_history(&self, days: u32) -> Result<BTreeMap<String, Vec<ProbeRecord>>> {
        Ok(self.query.all_history(query::days(days)).await?)
    }

    pub async fn uptime(&self, service: &str, days: u32) -> Result<f64> {
        Ok(self.query.uptime(service, query::days(days)).await?)
    }

    /// Uptime of every configured service
    pub async fn all_uptime(&self, days: u32) -> Result<BTreeMap<String, ServiceUptime>> {
        Ok(self.query.all_uptime(&self.config.services, query::days(days)).await?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &HealthCheckScheduler {
        &self.scheduler
    }

    pub fn query(&self) -> &StatusQuery {
        &self.query
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.retention_handle.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}
