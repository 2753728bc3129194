//! UnitOfWork - queue writes across collections and commit them atomically.
//!
//! ## Example
//!
//! ```ignore
//! let mut unit = UnitOfWork::new();
//! unit.update(&holdings, holdings.version)?
//!     .update(&item, item.version)?;
//! let receipt = store.run_atomic(unit)?;
//! ```

use serde_json::Value;

use super::ModelError;
use crate::model::{ForeignKey, Record};

/// A record serialized for a queued write (type-erased).
#[derive(Debug, Clone)]
pub struct StagedRecord {
    pub collection: &'static str,
    pub id: String,
    pub value: Value,
    pub version: Option<i64>,
    pub hrid: Option<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl StagedRecord {
    fn of<T: Record>(record: &T) -> Result<Self, ModelError> {
        if record.id().trim().is_empty() {
            return Err(ModelError::Storage(format!(
                "cannot write a {} record without an id",
                T::COLLECTION
            )));
        }
        Ok(StagedRecord {
            collection: T::COLLECTION,
            id: record.id().to_string(),
            value: serde_json::to_value(record)?,
            version: record.version(),
            hrid: record.hrid().map(str::to_string),
            foreign_keys: record.foreign_keys(),
        })
    }
}

/// A single queued write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Fails when the id already exists.
    Insert(StagedRecord),
    /// Insert, or overwrite without a version check.
    Upsert(StagedRecord),
    /// Overwrite an existing record. `None` skips the version check.
    Update {
        record: StagedRecord,
        expected_version: Option<i64>,
    },
    Delete {
        collection: &'static str,
        id: String,
    },
    DeleteAll {
        collection: String,
    },
    /// Restart a sequence so the next allocated value is `start`.
    ResetSequence {
        sequence: String,
        start: i64,
    },
}

/// Ordered list of writes that commit together.
#[derive(Debug, Default, Clone)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Record>(&mut self, record: &T) -> Result<&mut Self, ModelError> {
        self.ops.push(WriteOp::Insert(StagedRecord::of(record)?));
        Ok(self)
    }

    pub fn upsert<T: Record>(&mut self, record: &T) -> Result<&mut Self, ModelError> {
        self.ops.push(WriteOp::Upsert(StagedRecord::of(record)?));
        Ok(self)
    }

    /// Queue an update. A negative expected version disables the check.
    pub fn update<T: Record>(
        &mut self,
        record: &T,
        expected_version: Option<i64>,
    ) -> Result<&mut Self, ModelError> {
        self.ops.push(WriteOp::Update {
            record: StagedRecord::of(record)?,
            expected_version: expected_version.filter(|v| *v >= 0),
        });
        Ok(self)
    }

    pub fn delete<T: Record>(&mut self, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: T::COLLECTION,
            id: id.into(),
        });
        self
    }

    pub fn delete_all(&mut self, collection: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::DeleteAll {
            collection: collection.into(),
        });
        self
    }

    pub fn reset_sequence(&mut self, sequence: impl Into<String>, start: i64) -> &mut Self {
        self.ops.push(WriteOp::ResetSequence {
            sequence: sequence.into(),
            start,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
