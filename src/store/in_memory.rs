//! InMemoryRecordStore - BTreeMap-backed record store for testing and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use super::unit_of_work::StagedRecord;
use super::{
    record_key, CommitReceipt, ConstraintViolation, ModelError, RecordStore, StoreStats,
    UnitOfWork, WriteOp,
};
use crate::model::Record;

/// Version given to a record inserted without one.
pub const INITIAL_VERSION: i64 = 1;

/// Internal stored representation of a record. `value` carries `_version`.
#[derive(Clone)]
struct StoredRecord {
    value: Value,
    version: i64,
    hrid: Option<String>,
}

#[derive(Clone, Default)]
struct State {
    records: BTreeMap<String, StoredRecord>,
    /// Next value each sequence will hand out.
    sequences: HashMap<String, i64>,
}

/// In-memory record store.
///
/// Storage key is `"COLLECTION:id"`, so a collection is a contiguous key
/// range. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<State>>,
    stats: Arc<Mutex<StoreStats>>,
    commit_failure: Arc<Mutex<Option<String>>>,
}

fn poisoned<T>(_: T) -> ModelError {
    ModelError::Storage("lock poisoned".into())
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Round trips served so far.
    pub fn stats(&self) -> Result<StoreStats, ModelError> {
        Ok(*self.stats.lock().map_err(poisoned)?)
    }

    /// Make the next `run_atomic` fail with a storage error after staging its writes.
    pub fn fail_next_commit(&self, message: impl Into<String>) -> Result<(), ModelError> {
        *self.commit_failure.lock().map_err(poisoned)? = Some(message.into());
        Ok(())
    }

    fn count(&self, bump: impl FnOnce(&mut StoreStats)) -> Result<(), ModelError> {
        bump(&mut *self.stats.lock().map_err(poisoned)?);
        Ok(())
    }

    fn decode<T: Record>(stored: &StoredRecord) -> Result<T, ModelError> {
        let mut record: T = serde_json::from_value(stored.value.clone())?;
        record.set_version(Some(stored.version));
        Ok(record)
    }

    fn collection_range<'a>(
        records: &'a BTreeMap<String, StoredRecord>,
        collection: &str,
    ) -> impl Iterator<Item = (&'a String, &'a StoredRecord)> {
        let prefix = format!("{}:", collection);
        records
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
    }

    fn check_constraints(
        state: &State,
        staged: &StagedRecord,
        key: &str,
    ) -> Result<(), ModelError> {
        for fk in &staged.foreign_keys {
            if !state
                .records
                .contains_key(&record_key(fk.collection, &fk.value))
            {
                return Err(ModelError::Constraint(ConstraintViolation::ForeignKey {
                    table: staged.collection.to_string(),
                    detail: format!(
                        "Key ({})=({}) is not present in table \"{}\".",
                        fk.field, fk.value, fk.collection
                    ),
                }));
            }
        }

        if let Some(hrid) = staged.hrid.as_deref() {
            let taken = Self::collection_range(&state.records, staged.collection)
                .any(|(other, stored)| other != key && stored.hrid.as_deref() == Some(hrid));
            if taken {
                return Err(ModelError::Constraint(ConstraintViolation::Unique {
                    table: staged.collection.to_string(),
                    detail: format!("Key (hrid)=({}) already exists.", hrid),
                }));
            }
        }

        Ok(())
    }

    fn write(
        state: &mut State,
        staged: StagedRecord,
        key: String,
        version: i64,
        receipt: &mut CommitReceipt,
    ) {
        let mut value = staged.value;
        if let Value::Object(map) = &mut value {
            map.insert("_version".into(), Value::from(version));
        }
        state.records.insert(
            key.clone(),
            StoredRecord {
                value,
                version,
                hrid: staged.hrid,
            },
        );
        receipt.versions.insert(key, version);
    }

    fn apply(state: &mut State, op: WriteOp, receipt: &mut CommitReceipt) -> Result<(), ModelError> {
        match op {
            WriteOp::Insert(staged) => {
                let key = record_key(staged.collection, &staged.id);
                if state.records.contains_key(&key) {
                    return Err(ModelError::Constraint(ConstraintViolation::Unique {
                        table: staged.collection.to_string(),
                        detail: format!("Key (id)=({}) already exists.", staged.id),
                    }));
                }
                Self::check_constraints(state, &staged, &key)?;
                let version = staged.version.filter(|v| *v >= 0).unwrap_or(INITIAL_VERSION);
                Self::write(state, staged, key, version, receipt);
            }
            WriteOp::Upsert(staged) => {
                let key = record_key(staged.collection, &staged.id);
                Self::check_constraints(state, &staged, &key)?;
                let version = match state.records.get(&key) {
                    Some(existing) => existing.version + 1,
                    None => staged.version.filter(|v| *v >= 0).unwrap_or(INITIAL_VERSION),
                };
                Self::write(state, staged, key, version, receipt);
            }
            WriteOp::Update {
                record,
                expected_version,
            } => {
                let key = record_key(record.collection, &record.id);
                let actual = state
                    .records
                    .get(&key)
                    .map(|stored| stored.version)
                    .ok_or_else(|| ModelError::NotFound {
                        collection: record.collection.to_string(),
                        id: record.id.clone(),
                    })?;
                if let Some(expected) = expected_version {
                    if expected != actual {
                        return Err(ModelError::ConcurrencyConflict {
                            collection: record.collection.to_string(),
                            id: record.id.clone(),
                            expected,
                            actual,
                        });
                    }
                }
                Self::check_constraints(state, &record, &key)?;
                Self::write(state, record, key, actual + 1, receipt);
            }
            WriteOp::Delete { collection, id } => {
                if state.records.remove(&record_key(collection, &id)).is_some() {
                    receipt.deleted += 1;
                }
            }
            WriteOp::DeleteAll { collection } => {
                let keys: Vec<String> = Self::collection_range(&state.records, &collection)
                    .map(|(key, _)| key.clone())
                    .collect();
                receipt.deleted += keys.len();
                for key in keys {
                    state.records.remove(&key);
                }
            }
            WriteOp::ResetSequence { sequence, start } => {
                if start < 1 {
                    return Err(ModelError::Storage(format!(
                        "sequence {} cannot restart at {}",
                        sequence, start
                    )));
                }
                state.sequences.insert(sequence, start);
            }
        }
        Ok(())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get_by_id<T: Record>(&self, id: &str) -> Result<Option<T>, ModelError> {
        self.count(|s| s.reads += 1)?;
        let state = self.state.read().map_err(poisoned)?;

        match state.records.get(&record_key(T::COLLECTION, id)) {
            Some(stored) => Ok(Some(Self::decode(stored)?)),
            None => Ok(None),
        }
    }

    fn get_by_ids<T: Record>(&self, ids: &[String]) -> Result<HashMap<String, T>, ModelError> {
        self.count(|s| s.reads += 1)?;
        let state = self.state.read().map_err(poisoned)?;

        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(stored) = state.records.get(&record_key(T::COLLECTION, id)) {
                found.insert(id.clone(), Self::decode(stored)?);
            }
        }
        Ok(found)
    }

    fn find<T: Record>(
        &self,
        predicate: &dyn Fn(&T) -> bool,
        limit: Option<usize>,
    ) -> Result<Vec<T>, ModelError> {
        self.count(|s| s.reads += 1)?;
        let state = self.state.read().map_err(poisoned)?;

        let mut results = Vec::new();
        for (_, stored) in Self::collection_range(&state.records, T::COLLECTION) {
            if limit.is_some_and(|max| results.len() >= max) {
                break;
            }
            let record: T = Self::decode(stored)?;
            if predicate(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    fn allocate_sequence_values(
        &self,
        sequence: &str,
        count: usize,
    ) -> Result<Vec<i64>, ModelError> {
        self.count(|s| s.sequence_calls += 1)?;
        let mut state = self.state.write().map_err(poisoned)?;

        let next = state.sequences.entry(sequence.to_string()).or_insert(1);
        let first = *next;
        *next += count as i64;
        Ok((first..first + count as i64).collect())
    }

    fn run_atomic(&self, unit: UnitOfWork) -> Result<CommitReceipt, ModelError> {
        self.count(|s| s.commits += 1)?;
        let injected = self.commit_failure.lock().map_err(poisoned)?.take();
        let mut state = self.state.write().map_err(poisoned)?;

        let mut staged = state.clone();
        let mut receipt = CommitReceipt::default();
        for op in unit.into_ops() {
            Self::apply(&mut staged, op, &mut receipt)?;
        }
        if let Some(message) = injected {
            return Err(ModelError::Storage(message));
        }

        *state = staged;
        Ok(receipt)
    }
}
