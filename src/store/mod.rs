//! Store boundary - point and multi-key lookups, predicate scans, sequences,
//! and an atomic unit of work.
//!
//! The relational engine itself is outside this crate. [`RecordStore`] is the
//! contract the pipelines consume and [`InMemoryRecordStore`] is a complete
//! implementation used for tests and embedding.

mod in_memory;
mod record_repository;
mod unit_of_work;

use std::collections::HashMap;
use std::fmt;

use crate::model::Record;

/// Why the store refused a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// A referenced id does not exist. `detail` reads
    /// `Key (field)=(value) is not present in table "table".`
    ForeignKey { table: String, detail: String },
    /// A unique key already exists. `detail` reads `Key (field)=(value) already exists.`
    Unique { table: String, detail: String },
}

/// Error type for record store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Optimistic concurrency conflict.
    ConcurrencyConflict {
        collection: String,
        id: String,
        expected: i64,
        actual: i64,
    },
    /// Constraint rejected by the store.
    Constraint(ConstraintViolation),
    /// Serialization/deserialization error.
    Serde(String),
    /// Storage-level error.
    Storage(String),
    /// Record not found.
    NotFound { collection: String, id: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::ConcurrencyConflict {
                collection,
                id,
                expected,
                actual,
            } => write!(
                f,
                "concurrency conflict on {}:{} (expected version {}, actual {})",
                collection, id, expected, actual
            ),
            ModelError::Constraint(ConstraintViolation::ForeignKey { table, detail }) => {
                write!(f, "foreign key violation on {}: {}", table, detail)
            }
            ModelError::Constraint(ConstraintViolation::Unique { table, detail }) => {
                write!(f, "unique violation on {}: {}", table, detail)
            }
            ModelError::Serde(msg) => write!(f, "record serialization error: {}", msg),
            ModelError::Storage(msg) => write!(f, "record storage error: {}", msg),
            ModelError::NotFound { collection, id } => {
                write!(f, "record not found: {}:{}", collection, id)
            }
        }
    }
}

impl std::error::Error for ModelError {}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serde(err.to_string())
    }
}

/// Versions assigned by a committed unit of work, keyed by `collection:id`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub versions: HashMap<String, i64>,
    pub deleted: usize,
}

impl CommitReceipt {
    /// Version the record now has in the store, if the unit wrote it.
    pub fn version_of<T: Record>(&self, id: &str) -> Option<i64> {
        self.versions.get(&record_key(T::COLLECTION, id)).copied()
    }

    /// Copies the committed version onto the record.
    pub fn stamp<T: Record>(&self, record: &mut T) {
        if let Some(version) = self.version_of::<T>(record.id()) {
            record.set_version(Some(version));
        }
    }
}

/// Round trips served by a store, per kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: usize,
    pub commits: usize,
    pub sequence_calls: usize,
}

/// Abstract storage for inventory records.
///
/// Every method is one round trip to the backing store.
pub trait RecordStore: Send + Sync {
    /// Get a record by id. Returns None if not found.
    fn get_by_id<T: Record>(&self, id: &str) -> Result<Option<T>, ModelError>;

    /// Get every listed record that exists, keyed by id.
    fn get_by_ids<T: Record>(&self, ids: &[String]) -> Result<HashMap<String, T>, ModelError>;

    /// Records matching a predicate, ordered by id, at most `limit` of them.
    fn find<T: Record>(
        &self,
        predicate: &dyn Fn(&T) -> bool,
        limit: Option<usize>,
    ) -> Result<Vec<T>, ModelError>;

    /// Reserve `count` consecutive values of a named sequence.
    fn allocate_sequence_values(&self, sequence: &str, count: usize)
        -> Result<Vec<i64>, ModelError>;

    /// Apply every write of the unit, or none of them.
    fn run_atomic(&self, unit: UnitOfWork) -> Result<CommitReceipt, ModelError>;
}

pub(crate) fn record_key(collection: &str, id: &str) -> String {
    format!("{}:{}", collection, id)
}

pub use in_memory::InMemoryRecordStore;
pub use record_repository::{RecordRepository, RecordsExt};
pub use unit_of_work::{StagedRecord, UnitOfWork, WriteOp};
