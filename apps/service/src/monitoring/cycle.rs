use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::executor::ProbeExecutor;
use super::types::ProbeRecord;
use crate::config::ServiceConfig;
use crate::database::RecordStore;

/// Outcome of one cycle over every configured service
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// One record per configured service, in configuration order
    pub records: Vec<ProbeRecord>,
    /// Records the store acknowledged
    pub persisted: usize,
}

/// One scheduled batch of probes.
///
/// An `Err` means the batch itself broke down; probes reporting `offline`
/// or `error` are a successful cycle.
#[async_trait::async_trait]
pub trait CheckCycle: Send + Sync {
    async fn run(&self) -> Result<CycleReport>;
}

/// Probes every configured service concurrently and appends the results
pub struct ProbeCycle {
    executor: Arc<ProbeExecutor>,
    store: Arc<dyn RecordStore>,
    services: Arc<[ServiceConfig]>,
    timeout: Duration,
    in_flight: Arc<watch::Sender<usize>>,
}

impl ProbeCycle {
    pub fn new(
        executor: Arc<ProbeExecutor>,
        store: Arc<dyn RecordStore>,
        services: Arc<[ServiceConfig]>,
        timeout: Duration,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self { executor, store, services, timeout, in_flight: Arc::new(in_flight) }
    }

    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    /// Probe tasks that have not yet persisted their record
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait up to `limit` for every spawned probe task to finish.
    /// Returns `false` if some were still running when the limit passed.
    pub async fn drain(&self, limit: Duration) -> bool {
        let mut idle = self.in_flight.subscribe();
        matches!(tokio::time::timeout(limit, idle.wait_for(|n| *n == 0)).await, Ok(Ok(_)))
    }
}

/// Counts one probe task from spawn until its record is persisted
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl InFlightGuard {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Probe one service and append its record. Runs as its own task so that a
/// cancelled cycle still lets the probe finish and persist.
async fn probe_and_persist(
    executor: Arc<ProbeExecutor>,
    store: Arc<dyn RecordStore>,
    service: ServiceConfig,
    timeout: Duration,
) -> (ProbeRecord, bool) {
    let record = match executor.probe(&service, timeout).await {
        Ok(record) => record,
        Err(e) => {
            error!("Error checking service {}: {}", service.name, e);
            ProbeRecord::check_failed(&service, e)
        }
    };

    let persisted = persist(store.as_ref(), &record).await;
    (record, persisted)
}

async fn persist(store: &dyn RecordStore, record: &ProbeRecord) -> bool {
    match store.append(record.clone()).await {
        Ok(_) => true,
        Err(e) => {
            error!("Failed to store record for {}: {}", record.service, e);
            false
        }
    }
}

#[async_trait::async_trait]
impl CheckCycle for ProbeCycle {
    async fn run(&self) -> Result<CycleReport> {
        let handles: Vec<_> = self
            .services
            .iter()
            .cloned()
            .map(|service| {
                let guard = InFlightGuard::enter(&self.in_flight);
                let task = probe_and_persist(Arc::clone(&self.executor), Arc::clone(&self.store), service, self.timeout);
                tokio::spawn(async move {
                    let _guard = guard;
                    task.await
                })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut report = CycleReport { records: Vec::with_capacity(joined.len()), persisted: 0 };
        let mut cancelled = Vec::new();

        for (service, outcome) in self.services.iter().zip(joined) {
            match outcome {
                Ok((record, persisted)) => {
                    report.persisted += usize::from(persisted);
                    report.records.push(record);
                }
                Err(e) if e.is_panic() => {
                    warn!("Probe task for {} panicked", service.name);
                    let record = ProbeRecord::check_failed(service, "probe task panicked");
                    report.persisted += usize::from(persist(self.store.as_ref(), &record).await);
                    report.records.push(record);
                }
                Err(_) => cancelled.push(service.name.clone()),
            }
        }

        if !cancelled.is_empty() {
            bail!("probe tasks cancelled for: {}", cancelled.join(", "));
        }

        if !report.records.is_empty() && report.persisted == 0 {
            bail!("record store rejected all {} records", report.records.len());
        }

        let total = self.services.len();
        let online = report.records.iter().filter(|r| r.status.is_online()).count();
        info!(online, persisted = report.persisted, "Completed {}/{} service checks", report.records.len(), total);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{JsonlStore, RecordId, RecordPredicate, RecordScan, RetainFn, StoreError};
    use crate::monitoring::checker::{CheckFailure, Checker};
    use crate::monitoring::types::ProbeStatus;
    use std::collections::{HashMap, HashSet};
    use tempfile::tempdir;

    /// Answers after a per-service delay with a per-service status
    struct ScriptedChecker {
        delays_ms: HashMap<String, u64>,
    }

    #[async_trait::async_trait]
    impl Checker for ScriptedChecker {
        async fn check(&self, service: &ServiceConfig, _deadline: Duration) -> Result<u16, CheckFailure> {
            let delay = self.delays_ms.get(&service.name).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if service.name.starts_with("panic") {
                panic!("checker blew up");
            }
            if service.name.starts_with("down") {
                return Err(CheckFailure::ConnectionRefused);
            }
            Ok(200)
        }
    }

    /// Store that refuses every append
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl RecordStore for ReadOnlyStore {
        async fn append(&self, _record: ProbeRecord) -> Result<RecordId, StoreError> {
            Err(StoreError::Io {
                path: "/readonly".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        async fn scan(&self, predicate: RecordPredicate) -> Result<RecordScan, StoreError> {
            Ok(RecordScan::new(Arc::new(Vec::new()), predicate))
        }

        async fn delete(&self, _ids: &HashSet<RecordId>) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn compact_all(&self, _keep: &RetainFn<'_>) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn len(&self) -> usize {
            0
        }
    }

    fn services(names: &[&str]) -> Arc<[ServiceConfig]> {
        names.iter().map(|n| ServiceConfig::new(*n, format!("http://{n}.invalid/"))).collect()
    }

    #[tokio::test]
    async fn test_concurrent_probes_yield_one_record_per_service() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path().join("status.jsonl")).await.unwrap());
        let names: Vec<String> = (0..8).map(|i| format!("svc-{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        // Later services finish first
        let delays_ms = names.iter().enumerate().map(|(i, n)| (n.clone(), (8 - i as u64) * 15)).collect();
        let executor = Arc::new(ProbeExecutor::with_checker(Arc::new(ScriptedChecker { delays_ms })));
        let cycle = ProbeCycle::new(executor, store.clone(), services(&name_refs), Duration::from_secs(5));

        let report = cycle.run().await.unwrap();

        assert_eq!(report.records.len(), 8);
        assert_eq!(report.persisted, 8);
        let reported: Vec<&str> = report.records.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(reported, name_refs);

        let stored: HashSet<String> =
            store.scan(Box::new(|_: &ProbeRecord| true)).await.unwrap().records().map(|r| r.service).collect();
        assert_eq!(stored, names.into_iter().collect::<HashSet<_>>());
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_raised() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path().join("status.jsonl")).await.unwrap());
        let executor = Arc::new(ProbeExecutor::with_checker(Arc::new(ScriptedChecker { delays_ms: HashMap::new() })));
        let mut configured: Vec<ServiceConfig> = services(&["up", "down-1", "panic-1"]).to_vec();
        configured.push(ServiceConfig::new("no-url", ""));
        let cycle = ProbeCycle::new(executor, store.clone(), configured.into(), Duration::from_secs(5));

        let report = cycle.run().await.unwrap();

        let by_name: HashMap<&str, &ProbeRecord> = report.records.iter().map(|r| (r.service.as_str(), r)).collect();
        assert_eq!(by_name["up"].status, ProbeStatus::Online);
        assert_eq!(by_name["down-1"].status, ProbeStatus::Offline);
        assert_eq!(by_name["panic-1"].status, ProbeStatus::Error);
        assert!(by_name["panic-1"].message.starts_with("Check failed"));
        assert_eq!(by_name["no-url"].status, ProbeStatus::Error);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_store_rejecting_everything_fails_the_cycle() {
        let executor = Arc::new(ProbeExecutor::with_checker(Arc::new(ScriptedChecker { delays_ms: HashMap::new() })));
        let cycle = ProbeCycle::new(executor, Arc::new(ReadOnlyStore), services(&["a", "b"]), Duration::from_secs(5));

        let result = cycle.run().await;

        assert!(result.is_err());
    }
}
