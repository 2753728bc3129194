//! Records - the persisted inventory hierarchy.
//!
//! An [`Instance`] is the bibliographic root, a [`HoldingsRecord`] belongs to
//! one instance and an [`Item`] belongs to one holdings record. All three are
//! stored through the same [`Record`] contract so the store, the pipelines and
//! the event publisher can treat them generically.
//!
//! ## Example
//!
//! ```ignore
//! use inventory_storage::{InMemoryRecordStore, Item, RecordsExt};
//!
//! let store = InMemoryRecordStore::new();
//! let item = store.records::<Item>().get("item-1")?;
//! ```

mod common;
mod holdings;
mod instance;
mod item;

use serde::{de::DeserializeOwned, Serialize};

pub use common::{
    is_blank, now_iso, CirculationNote, EffectiveCallNumberComponents, ItemStatus, Metadata,
    Note,
};
pub use holdings::HoldingsRecord;
pub use instance::Instance;
pub use item::Item;

/// A reference from one record to the id of a record in another collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    /// JSON field on the referencing record, e.g. `holdingsRecordId`.
    pub field: &'static str,
    /// Collection that must contain the referenced id.
    pub collection: &'static str,
    pub value: String,
}

/// Trait for types that can be persisted in a [`RecordStore`](crate::RecordStore).
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + std::fmt::Debug {
    /// Table name for this record type.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Optimistic lock token, mirrored from the store on every read.
    fn version(&self) -> Option<i64> {
        None
    }

    fn set_version(&mut self, _version: Option<i64>) {}

    /// Human readable identifier, unique per collection once assigned.
    fn hrid(&self) -> Option<&str> {
        None
    }

    fn set_hrid(&mut self, _hrid: String) {}

    fn metadata(&self) -> Option<&Metadata> {
        None
    }

    fn set_metadata(&mut self, _metadata: Metadata) {}

    /// References the store must resolve before accepting a write.
    fn foreign_keys(&self) -> Vec<ForeignKey> {
        Vec::new()
    }
}

/// Assigns a fresh v4 uuid when the record has no id yet.
pub fn ensure_id<T: Record>(record: &mut T) {
    if record.id().trim().is_empty() {
        record.set_id(uuid::Uuid::new_v4().to_string());
    }
}

/// Returns true when `value` parses as a UUID.
pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}
