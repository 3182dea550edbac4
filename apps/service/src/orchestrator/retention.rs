//! Automatic retention of probe records.
//!
//! Records older than the retention horizon are compacted out of the store.
//! Compaction runs once at start and then on its own interval (daily by
//! default), independent of the check scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{RecordStore, StoreError};
use crate::monitoring::types::ProbeRecord;
use crate::query::{days, window_start};

/// Retention policy for probe records
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep records
    pub retention_days: u32,
    /// Time between two compaction passes
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { retention_days: 7, interval: Duration::from_secs(24 * 3600) }
    }
}

impl From<&Config> for RetentionPolicy {
    fn from(config: &Config) -> Self {
        Self { retention_days: config.retention_days, interval: config.compaction_interval() }
    }
}

impl RetentionPolicy {
    /// Oldest timestamp still retained when compacting at `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        window_start(now, days(self.retention_days))
    }
}

/// Compactor for expired records
pub struct RetentionCompactor {
    store: Arc<dyn RecordStore>,
    policy: RetentionPolicy,
}

impl RetentionCompactor {
    pub fn new(store: Arc<dyn RecordStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Run one compaction pass with the cutoff taken from the current time
    pub async fn compact_once(&self) -> Result<usize, StoreError> {
        self.compact_before(self.policy.cutoff(Utc::now())).await
    }

    /// Remove every record with `timestamp < cutoff`. A record stamped
    /// exactly at the cutoff is kept.
    pub async fn compact_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        debug!(%cutoff, retention_days = self.policy.retention_days, "Starting retention compaction");

        let removed = self.store.compact_all(&move |record: &ProbeRecord| record.timestamp >= cutoff).await?;
        if removed > 0 {
            info!("Cleaned up {} old records", removed);
        }
        Ok(removed)
    }

    /// Start the background compaction task. The first pass runs right away.
    pub fn start_periodic_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let compactor = RetentionCompactor::new(Arc::clone(&self.store), self.policy.clone());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(compactor.policy.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match compactor.compact_once().await {
                    Ok(count) => debug!("Periodic retention compaction completed: {} deleted", count),
                    Err(e) => warn!("Periodic retention compaction failed: {}", e),
                }
            }
        })
    }
}
