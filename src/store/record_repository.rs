//! RecordRepository - Typed accessor for one collection of a store.

use std::collections::HashMap;
use std::marker::PhantomData;

use super::{ModelError, RecordStore};
use crate::model::Record;

/// Typed repository wrapper for records of a specific type.
pub struct RecordRepository<'a, S, T> {
    store: &'a S,
    _marker: PhantomData<T>,
}

impl<'a, S: RecordStore, T: Record> RecordRepository<'a, S, T> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, ModelError> {
        self.store.get_by_id(id)
    }

    /// Get a record or fail with [`ModelError::NotFound`].
    pub fn fetch(&self, id: &str) -> Result<T, ModelError> {
        self.get(id)?.ok_or_else(|| ModelError::NotFound {
            collection: T::COLLECTION.to_string(),
            id: id.to_string(),
        })
    }

    /// Multi-key lookup with duplicate ids collapsed.
    pub fn get_many<I, K>(&self, ids: I) -> Result<HashMap<String, T>, ModelError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            return Ok(HashMap::new());
        }
        self.store.get_by_ids(&unique)
    }

    pub fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, ModelError> {
        self.store.find(predicate, None)
    }

    pub fn find_limited(
        &self,
        predicate: &dyn Fn(&T) -> bool,
        limit: usize,
    ) -> Result<Vec<T>, ModelError> {
        self.store.find(predicate, Some(limit))
    }
}

/// Extension trait for typed record access on any RecordStore.
pub trait RecordsExt: RecordStore + Sized {
    /// Get a typed record repository.
    fn records<T: Record>(&self) -> RecordRepository<'_, Self, T> {
        RecordRepository::new(self)
    }
}

impl<S: RecordStore> RecordsExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Instance;
    use crate::store::{InMemoryRecordStore, UnitOfWork};

    #[test]
    fn get_many_dedups_and_skips_round_trip_when_empty() {
        let store = InMemoryRecordStore::new();
        let mut unit = UnitOfWork::new();
        unit.insert(&Instance::new("i-1", "A")).unwrap();
        store.run_atomic(unit).unwrap();

        let before = store.stats().unwrap().reads;
        let none = store.records::<Instance>().get_many(Vec::<String>::new()).unwrap();
        assert!(none.is_empty());
        assert_eq!(store.stats().unwrap().reads, before);

        let found = store
            .records::<Instance>()
            .get_many(["i-1", "i-1", "i-2"])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(store.stats().unwrap().reads, before + 1);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store.records::<Instance>().fetch("nope").unwrap_err();
        assert_eq!(
            err,
            ModelError::NotFound {
                collection: "instance".into(),
                id: "nope".into()
            }
        );
    }
}
