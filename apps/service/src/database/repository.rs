use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::models::{RecordId, RecordPredicate, RecordScan, RetainFn, StoredRecord};
use crate::monitoring::types::ProbeRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record log I/O failed at {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| StoreError::Io { path: path.to_path_buf(), source }
    }
}

/// Record store trait for abstracting the persisted probe log
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Durably persist one record and return its id.
    ///
    /// Once this returns `Ok`, the record is visible to every scan started
    /// afterwards.
    async fn append(&self, record: ProbeRecord) -> Result<RecordId, StoreError>;

    /// All currently stored records matching `predicate`, in no particular order
    async fn scan(&self, predicate: RecordPredicate) -> Result<RecordScan, StoreError>;

    /// Remove the named records. Ids that are already gone are ignored.
    async fn delete(&self, ids: &HashSet<RecordId>) -> Result<usize, StoreError>;

    /// Drop every record for which `keep` is false in one pass
    async fn compact_all(&self, keep: &RetainFn<'_>) -> Result<usize, StoreError>;

    /// Number of records currently stored
    async fn len(&self) -> usize;
}

/// Line-delimited JSON record log.
///
/// Mutations are serialized by the writer lock. Reads clone an `Arc` of the
/// in-memory index and never wait for the writer. Deletion rewrites the log
/// into a temporary file and renames it over the original.
///
/// The in-memory index is authoritative. A writer slot of `None` means the
/// file may have diverged from it (a failed write left torn bytes, or the
/// handle could not be reopened after a rewrite); the next mutation then
/// rewrites the file from memory before touching it.
pub struct JsonlStore {
    path: PathBuf,
    writer: Mutex<Option<File>>,
    records: RwLock<Arc<Vec<StoredRecord>>>,
}

impl JsonlStore {
    /// Open (or create) the log at `path` and load its records.
    ///
    /// Lines that cannot be parsed, such as a write torn by a crash, are
    /// dropped and the log is rewritten without them.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(StoreError::io(parent))?;
        }

        let (records, needs_rewrite) = match fs::read_to_string(&path).await {
            Ok(content) => parse_log(&path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), false),
            Err(e) => return Err(StoreError::io(&path)(e)),
        };

        if needs_rewrite {
            write_log(&path, &records).await?;
        }

        let writer = open_append(&path).await?;
        info!(path = %path.display(), records = records.len(), "Record store opened");

        Ok(Self { path, writer: Mutex::new(Some(writer)), records: RwLock::new(Arc::new(records)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Arc<Vec<StoredRecord>> {
        Arc::clone(&self.records.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_records(&self, records: Vec<StoredRecord>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(records);
    }

    /// Rewrite the log with `kept` and swap the append handle over to it.
    ///
    /// Must be called with the writer lock held. The old handle is released
    /// first: once the rename happens it points at an unlinked file.
    async fn rewrite(&self, writer: &mut Option<File>, kept: Vec<StoredRecord>) -> Result<(), StoreError> {
        *writer = None;
        write_log(&self.path, &kept).await?;
        self.replace_records(kept);
        *writer = Some(open_append(&self.path).await?);
        Ok(())
    }

    /// Append handle for the live log, resyncing the file from memory first
    /// when an earlier mutation left it in doubt.
    ///
    /// Must be called with the writer lock held.
    async fn ready_writer<'w>(&self, writer: &'w mut Option<File>) -> Result<&'w mut File, StoreError> {
        if writer.is_none() {
            warn!(path = %self.path.display(), "Resyncing record log from memory");
            write_log(&self.path, &self.snapshot()).await?;
            *writer = Some(open_append(&self.path).await?);
        }

        writer.as_mut().ok_or_else(|| StoreError::Io {
            path: self.path.clone(),
            source: std::io::Error::other("record log is not open"),
        })
    }

    /// Swap the append handle for one that rejects writes
    #[cfg(test)]
    async fn break_writer(&self) {
        let read_only = std::fs::File::open(&self.path).unwrap();
        *self.writer.lock().await = Some(File::from_std(read_only));
    }

    /// Forget the append handle, as after a failed reopen
    #[cfg(test)]
    async fn drop_writer(&self) {
        *self.writer.lock().await = None;
    }
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn append(&self, record: ProbeRecord) -> Result<RecordId, StoreError> {
        let stored = StoredRecord::new(record);
        let mut line = serde_json::to_string(&stored)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let file = self.ready_writer(&mut writer).await?;
        if let Err(e) = write_line(file, line.as_bytes()).await {
            // The file may now end in a partial line
            *writer = None;
            return Err(StoreError::io(&self.path)(e));
        }

        let id = stored.id;
        {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            Arc::make_mut(&mut *records).push(stored);
        }
        drop(writer);

        Ok(id)
    }

    async fn scan(&self, predicate: RecordPredicate) -> Result<RecordScan, StoreError> {
        Ok(RecordScan::new(self.snapshot(), predicate))
    }

    async fn delete(&self, ids: &HashSet<RecordId>) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut writer = self.writer.lock().await;
        let current = self.snapshot();
        let kept: Vec<StoredRecord> = current.iter().filter(|s| !ids.contains(&s.id)).cloned().collect();
        let deleted = current.len() - kept.len();

        if deleted > 0 {
            self.rewrite(&mut writer, kept).await?;
            debug!(deleted, "Deleted records from store");
        }

        Ok(deleted)
    }

    async fn compact_all(&self, keep: &RetainFn<'_>) -> Result<usize, StoreError> {
        let mut writer = self.writer.lock().await;
        let current = self.snapshot();
        let kept: Vec<StoredRecord> = current.iter().filter(|s| keep(&s.record)).cloned().collect();
        let dropped = current.len() - kept.len();

        if dropped > 0 {
            self.rewrite(&mut writer, kept).await?;
        }

        Ok(dropped)
    }

    async fn len(&self) -> usize {
        self.snapshot().len()
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

async fn open_append(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new().create(true).append(true).open(path).await.map_err(StoreError::io(path))
}

/// Parse log content; the flag is set when any line had to be skipped
fn parse_log(path: &Path, content: &str) -> (Vec<StoredRecord>, bool) {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line) {
            Ok(stored) => records.push(stored),
            Err(e) => {
                skipped += 1;
                warn!(path = %path.display(), line = index + 1, "Skipping unreadable record: {e}");
            }
        }
    }

    let torn_tail = !content.is_empty() && !content.ends_with('\n');
    (records, skipped > 0 || torn_tail)
}

/// Write `records` to a sibling temp file, sync it and rename it over `path`
async fn write_log(path: &Path, records: &[StoredRecord]) -> Result<(), StoreError> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut buffer = String::new();
    for stored in records {
        buffer.push_str(&serde_json::to_string(stored)?);
        buffer.push('\n');
    }

    let mut file = File::create(&tmp_path).await.map_err(StoreError::io(&tmp_path))?;
    file.write_all(buffer.as_bytes()).await.map_err(StoreError::io(&tmp_path))?;
    file.flush().await.map_err(StoreError::io(&tmp_path))?;
    file.sync_all().await.map_err(StoreError::io(&tmp_path))?;
    drop(file);

    fs::rename(&tmp_path, path).await.map_err(StoreError::io(path))
}
