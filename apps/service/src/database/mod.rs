/// Record store
///
/// The store owns the persisted probe log. The scheduler appends to it, the
/// retention compactor deletes from it and the query layer only scans it.

pub mod models;
pub mod repository;

pub use models::{RecordId, RecordPredicate, RecordScan, RetainFn, StoredRecord};
pub use repository::{JsonlStore, RecordStore, StoreError};

use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

/// Attempts made by [`open_store`] before giving up
pub const OPEN_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled after every failed attempt
pub const OPEN_BACKOFF: Duration = Duration::from_secs(1);

/// Open the record log, retrying a few times with exponential backoff
pub async fn open_store(path: &Path) -> Result<JsonlStore, StoreError> {
    open_store_with_retry(path, OPEN_ATTEMPTS, OPEN_BACKOFF).await
}

pub async fn open_store_with_retry(
    path: &Path,
    attempts: u32,
    backoff: Duration,
) -> Result<JsonlStore, StoreError> {
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut attempt = 1;

    loop {
        match JsonlStore::open(path).await {
            Ok(store) => return Ok(store),
            Err(e) if attempt < attempts => {
                error!("Record store init failed ({attempt}/{attempts}): {e}");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
                info!("Retrying record store init");
            }
            Err(e) => {
                error!("Record store init failed ({attempt}/{attempts}): {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_store_creates_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db/status.jsonl");

        let store = open_store(&path).await.unwrap();

        assert_eq!(store.len().await, 0);
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_store_gives_up_after_attempts() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = open_store_with_retry(&blocker.join("status.jsonl"), 3, Duration::from_millis(10)).await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
    }
}
