//! Read-side views over the record store.
//!
//! Every query works on a single store snapshot, so a concurrent append or
//! compaction never yields a half-updated answer.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::database::{RecordStore, StoreError};
use crate::monitoring::types::ProbeRecord;

/// Uptime of one configured service, paired with its configuration
#[derive(Debug, Clone, Serialize)]
pub struct ServiceUptime {
    pub uptime: f64,
    pub config: ServiceConfig,
}

/// Query layer over a record store
#[derive(Clone)]
pub struct StatusQuery {
    store: Arc<dyn RecordStore>,
}

impl StatusQuery {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Most recent record per service. Services that were never probed are
    /// absent, which callers should read as "unknown".
    pub async fn latest_status(&self) -> Result<BTreeMap<String, ProbeRecord>, StoreError> {
        let mut latest: BTreeMap<String, ProbeRecord> = BTreeMap::new();

        for record in self.store.scan(Box::new(|_: &ProbeRecord| true)).await?.records() {
            match latest.entry(record.service.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    if record.timestamp >= slot.get().timestamp {
                        slot.insert(record);
                    }
                }
            }
        }

        Ok(latest)
    }

    /// Records of `service` no older than `window`, newest first
    pub async fn history(&self, service: &str, window: TimeDelta) -> Result<Vec<ProbeRecord>, StoreError> {
        let cutoff = window_start(Utc::now(), window);
        let service = service.to_owned();

        let mut records: Vec<ProbeRecord> = self
            .store
            .scan(Box::new(move |r: &ProbeRecord| r.service == service && r.timestamp >= cutoff))
            .await?
            .records()
            .collect();
        sort_newest_first(&mut records);

        Ok(records)
    }

    /// History of every service with records in the window
    pub async fn all_history(&self, window: TimeDelta) -> Result<BTreeMap<String, Vec<ProbeRecord>>, StoreError> {
        let cutoff = window_start(Utc::now(), window);

        let mut grouped: BTreeMap<String, Vec<ProbeRecord>> = BTreeMap::new();
        for record in self.store.scan(Box::new(move |r: &ProbeRecord| r.timestamp >= cutoff)).await?.records() {
            grouped.entry(record.service.clone()).or_default().push(record);
        }
        grouped.values_mut().for_each(|records| sort_newest_first(records));

        Ok(grouped)
    }

    /// Percentage of `online` records for `service` in the window.
    ///
    /// An empty window counts as 0% uptime.
    pub async fn uptime(&self, service: &str, window: TimeDelta) -> Result<f64, StoreError> {
        let records = self.history(service, window).await?;
        Ok(uptime_percentage(&records))
    }

    /// Uptime for every configured service, including ones without records
    pub async fn all_uptime(
        &self,
        services: &[ServiceConfig],
        window: TimeDelta,
    ) -> Result<BTreeMap<String, ServiceUptime>, StoreError> {
        let history = self.all_history(window).await?;

        Ok(services
            .iter()
            .map(|service| {
                let records = history.get(&service.name).map(Vec::as_slice).unwrap_or_default();
                let uptime = ServiceUptime { uptime: uptime_percentage(records), config: service.clone() };
                (service.name.clone(), uptime)
            })
            .collect())
    }
}

/// Start of a lookback window ending at `now`
pub fn window_start(now: DateTime<Utc>, window: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Lookback window of `days` whole days
pub fn days(days: u32) -> TimeDelta {
    TimeDelta::days(i64::from(days))
}

fn uptime_percentage(records: &[ProbeRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let online = records.iter().filter(|r| r.status.is_online()).count();
    100.0 * online as f64 / records.len() as f64
}

fn sort_newest_first(records: &mut [ProbeRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::JsonlStore;
    use tempfile::{TempDir, tempdir};

    async fn query_with(records: Vec<ProbeRecord>) -> (StatusQuery, Arc<JsonlStore>, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path().join("status.jsonl")).await.unwrap());
        for record in records {
            store.append(record).await.unwrap();
        }
        (StatusQuery::new(store.clone()), store, dir)
    }

    fn service(name: &str) -> ServiceConfig {
        ServiceConfig::new(name, format!("https://{name}.example.com"))
    }

    fn online(name: &str, age: TimeDelta) -> ProbeRecord {
        ProbeRecord::started(&service(name)).online(200, 10, "Service is online").at(Utc::now() - age)
    }

    fn offline(name: &str, age: TimeDelta) -> ProbeRecord {
        ProbeRecord::started(&service(name)).offline(10, "Connection refused").at(Utc::now() - age)
    }

    #[tokio::test]
    async fn test_latest_status_picks_max_timestamp() {
        let (query, _store, _dir) = query_with(vec![
            online("api", TimeDelta::minutes(1)),
            offline("api", TimeDelta::minutes(10)),
            offline("web", TimeDelta::minutes(2)),
        ])
        .await;

        let latest = query.latest_status().await.unwrap();

        assert_eq!(latest.len(), 2);
        assert!(latest["api"].status.is_online());
        assert!(!latest["web"].status.is_online());
        assert!(!latest.contains_key("never-probed"));
    }

    #[tokio::test]
    async fn test_history_is_windowed_and_newest_first() {
        let (query, _store, _dir) = query_with(vec![
            online("api", TimeDelta::hours(3)),
            online("api", TimeDelta::hours(1)),
            online("api", TimeDelta::days(8)),
            online("web", TimeDelta::hours(2)),
        ])
        .await;

        let history = query.history("api", days(7)).await.unwrap();

        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp > history[1].timestamp);
        assert!(history.iter().all(|r| r.service == "api"));
    }

    #[tokio::test]
    async fn test_all_history_groups_by_service() {
        let (query, _store, _dir) = query_with(vec![
            online("api", TimeDelta::hours(1)),
            offline("web", TimeDelta::hours(2)),
            online("web", TimeDelta::hours(1)),
            online("old", TimeDelta::days(30)),
        ])
        .await;

        let grouped = query.all_history(days(7)).await.unwrap();

        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["api", "web"]);
        assert_eq!(grouped["web"].len(), 2);
        assert!(grouped["web"][0].status.is_online());
    }

    #[tokio::test]
    async fn test_uptime_of_empty_window_is_zero() {
        let (query, _store, _dir) = query_with(vec![online("api", TimeDelta::days(10))]).await;

        assert_eq!(query.uptime("api", days(7)).await.unwrap(), 0.0);
        assert_eq!(query.uptime("missing", days(7)).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_uptime_all_online_is_hundred() {
        let (query, _store, _dir) = query_with(vec![
            online("api", TimeDelta::hours(1)),
            online("api", TimeDelta::hours(2)),
        ])
        .await;

        assert_eq!(query.uptime("api", days(7)).await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_uptime_never_decreases_with_another_online_record() {
        let (query, store, _dir) = query_with(vec![
            online("api", TimeDelta::hours(1)),
            offline("api", TimeDelta::hours(2)),
            offline("api", TimeDelta::hours(3)),
        ])
        .await;

        let mut previous = query.uptime("api", days(7)).await.unwrap();
        assert!((previous - 100.0 / 3.0).abs() < 1e-9);

        for _ in 0..3 {
            store.append(online("api", TimeDelta::minutes(5))).await.unwrap();
            let current = query.uptime("api", days(7)).await.unwrap();
            assert!(current >= previous);
            previous = current;
        }
        assert!((previous - 400.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_uptime_covers_unprobed_services() {
        let (query, _store, _dir) = query_with(vec![
            online("api", TimeDelta::hours(1)),
            offline("api", TimeDelta::hours(2)),
        ])
        .await;

        let uptime = query.all_uptime(&[service("api"), service("web")], days(7)).await.unwrap();

        assert_eq!(uptime["api"].uptime, 50.0);
        assert_eq!(uptime["web"].uptime, 0.0);
        assert_eq!(uptime["web"].config.url, "https://web.example.com");
    }

    #[test]
    fn test_window_start_saturates() {
        let now = Utc::now();
        assert_eq!(window_start(now, TimeDelta::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(window_start(now, days(1)), now - TimeDelta::days(1));
    }
}
