use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::ProbeRecord;

/// Store-scoped identity of a record. Only used for targeted deletion,
/// never for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One line of the record log: the probe outcome plus its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: ProbeRecord,
}

impl StoredRecord {
    pub fn new(record: ProbeRecord) -> Self {
        Self { id: RecordId::new(), record }
    }
}

/// Filter applied by a scan
pub type RecordPredicate = Box<dyn Fn(&ProbeRecord) -> bool + Send + Sync>;

/// Borrowed keep-predicate used by compaction. The explicit `for<'r>` keeps
/// it higher-ranked inside `async_trait` methods.
pub type RetainFn<'a> = dyn for<'r> Fn(&'r ProbeRecord) -> bool + Send + Sync + 'a;

/// Lazy, one-shot pass over a snapshot of the store.
///
/// The snapshot is taken when the scan starts; appends made afterwards are
/// not visible to it and it never holds a store lock while iterating.
pub struct RecordScan {
    snapshot: Arc<Vec<StoredRecord>>,
    position: usize,
    predicate: RecordPredicate,
}

impl RecordScan {
    pub fn new(snapshot: Arc<Vec<StoredRecord>>, predicate: RecordPredicate) -> Self {
        Self { snapshot, position: 0, predicate }
    }

    /// Drop the ids and keep only the probe outcomes
    pub fn records(self) -> impl Iterator<Item = ProbeRecord> {
        self.map(|stored| stored.record)
    }
}

impl Iterator for RecordScan {
    type Item = StoredRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(stored) = self.snapshot.get(self.position) {
            self.position += 1;
            if (self.predicate)(&stored.record) {
                return Some(stored.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.snapshot.len().saturating_sub(self.position)))
    }
}
