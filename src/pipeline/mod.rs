//! Mutation pipelines - create, replace, patch and delete for instances,
//! holdings and items.
//!
//! Every operation runs its steps strictly in order: validate, read what it
//! needs with as few round trips as possible, derive values, persist in one
//! atomic unit, and only then announce the committed change. A failed unit
//! publishes nothing.
//!
//! The steps shared by all three record types live on [`Pipeline`]; the
//! per-entity services add what is specific to them (item effective values,
//! holdings cascades, instance dependents).

mod batch;
mod holdings;
mod instance;
mod item;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::InventoryConfig;
use crate::cql::CqlQuery;
use crate::error::{InventoryError, Result, ValidationFailure};
use crate::events::{
    Broker, DomainEventPublisher, DomainEventType, EventSource, FailureHandler, FailureLog,
    StreamAborted,
};
use crate::hrid::{HridKind, HridManager};
use crate::model::{ensure_id, is_blank, is_uuid, HoldingsRecord, Instance, Item, Metadata};
use crate::patch::equals_ignoring_metadata;
use crate::store::{CommitReceipt, RecordStore, RecordsExt, UnitOfWork};

pub use batch::BatchOperationContext;
pub use holdings::HoldingsService;
pub use instance::InstanceService;
pub use item::ItemService;

/// Successful result of a pipeline operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Record(T),
    NoContent,
}

impl<T> Outcome<T> {
    pub fn into_record(self) -> Option<T> {
        match self {
            Outcome::Record(record) => Some(record),
            Outcome::NoContent => None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, Outcome::NoContent)
    }
}

/// A record type the pipelines can create, replace and delete.
pub trait InventoryRecord: EventSource {
    const HRID_KIND: HridKind;

    fn statistical_code_ids(&self) -> &[String];

    /// Whether replacing `old` with `self` may assign a different HRID.
    fn may_change_hrid(&self, _old: &Self) -> bool {
        false
    }
}

impl InventoryRecord for Instance {
    const HRID_KIND: HridKind = HridKind::Instances;

    fn statistical_code_ids(&self) -> &[String] {
        &self.statistical_code_ids
    }

    fn may_change_hrid(&self, _old: &Self) -> bool {
        self.is_consortium_shadow_copy()
    }
}

impl InventoryRecord for HoldingsRecord {
    const HRID_KIND: HridKind = HridKind::Holdings;

    fn statistical_code_ids(&self) -> &[String] {
        &self.statistical_code_ids
    }
}

impl InventoryRecord for Item {
    const HRID_KIND: HridKind = HridKind::Items;

    fn statistical_code_ids(&self) -> &[String] {
        &self.statistical_code_ids
    }
}

pub(crate) fn validate_statistical_codes(ids: &[String]) -> Result<()> {
    match ids.iter().find(|id| !is_uuid(id)) {
        Some(invalid) => Err(InventoryError::Validation(vec![ValidationFailure::new(
            "statisticalCodeIds",
            "invalid UUID format of statistical code",
        )
        .with_value(invalid.clone())])),
        None => Ok(()),
    }
}

pub(crate) fn check_hrid_unchanged<T: InventoryRecord>(old: &T, new: &T) -> Result<()> {
    if new.hrid() == old.hrid() || new.may_change_hrid(old) {
        return Ok(());
    }
    Err(InventoryError::validation(
        "hrid",
        format!(
            "The hrid field cannot be changed: new={}, old={}",
            new.hrid().unwrap_or("null"),
            old.hrid().unwrap_or("null")
        ),
    ))
}

/// A batch create staged in a unit of work but not yet committed.
pub(crate) struct StagedBatch<T> {
    context: BatchOperationContext<T>,
    records: Vec<T>,
    unit: UnitOfWork,
}

/// A committed batch, split the way it will be announced.
pub(crate) struct CommittedBatch<T> {
    records: Vec<T>,
    created: Vec<T>,
    updated: Vec<(T, T)>,
    receipt: CommitReceipt,
}

/// Steps shared by every record type.
pub(crate) struct Pipeline<T, S> {
    store: S,
    hrids: HridManager<S>,
    events: DomainEventPublisher<T, S>,
    config: InventoryConfig,
}

impl<T: InventoryRecord, S: RecordStore + Clone> Pipeline<T, S> {
    pub(crate) fn new(
        store: S,
        broker: Arc<dyn Broker>,
        failures: Arc<dyn FailureHandler>,
        config: &InventoryConfig,
    ) -> Self {
        Pipeline {
            hrids: HridManager::new(store.clone()),
            events: DomainEventPublisher::new(store.clone(), broker, failures, config),
            store,
            config: config.clone(),
        }
    }

    pub(crate) fn fetch(&self, id: &str) -> Result<T> {
        Ok(self.store.records::<T>().fetch(id)?)
    }

    /// Validate, prepare, identify, insert and announce one record.
    pub(crate) fn create_one<F>(&self, mut record: T, prepare: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        ensure_id(&mut record);
        validate_statistical_codes(record.statistical_code_ids())?;
        prepare(&mut record)?;
        self.hrids
            .populate(T::HRID_KIND, std::slice::from_mut(&mut record))?;
        record.set_metadata(Metadata::created_now());

        let mut unit = UnitOfWork::new();
        unit.insert(&record)?;
        let receipt = self.store.run_atomic(unit)?;
        receipt.stamp(&mut record);
        debug!(collection = T::COLLECTION, id = %record.id(), "record created");

        self.events.publish_created(&record);
        Ok(record)
    }

    /// Stage a batch create: new records are inserted, stored ones upserted.
    ///
    /// Without `upsert` every record is inserted and an existing id fails the
    /// whole batch at commit. Stored records keep their HRID when the
    /// incoming copy has none and reject a different one.
    pub(crate) fn stage_batch<F>(
        &self,
        mut records: Vec<T>,
        upsert: bool,
        prepare: F,
    ) -> Result<StagedBatch<T>>
    where
        F: FnOnce(&mut [T]) -> Result<()>,
    {
        self.config.check_batch_size(records.len())?;
        for record in records.iter_mut() {
            ensure_id(record);
            validate_statistical_codes(record.statistical_code_ids())?;
        }

        let context = if upsert {
            BatchOperationContext::load(&self.store, &records)?
        } else {
            BatchOperationContext::new(&records, HashMap::new())
        };

        prepare(&mut records)?;

        for record in records.iter_mut().filter(|r| is_blank(r.hrid())) {
            if let Some(hrid) = context.existing(record.id()).and_then(|old| old.hrid()) {
                record.set_hrid(hrid.to_string());
            }
        }
        for record in &records {
            if let Some(old) = context.existing(record.id()) {
                check_hrid_unchanged(old, record)?;
            }
        }
        self.hrids.populate(T::HRID_KIND, &mut records)?;

        let mut unit = UnitOfWork::new();
        for record in records.iter_mut() {
            let previous = context.existing(record.id()).cloned();
            match previous {
                Some(old) => {
                    record.set_metadata(Metadata::updated_from(old.metadata()));
                    unit.upsert(&*record)?;
                }
                None => {
                    record.set_metadata(Metadata::created_now());
                    unit.insert(&*record)?;
                }
            }
        }

        Ok(StagedBatch {
            context,
            records,
            unit,
        })
    }

    /// Commit a staged batch and re-read the upserted records.
    pub(crate) fn commit_batch(&self, staged: StagedBatch<T>) -> Result<CommittedBatch<T>> {
        let StagedBatch {
            context,
            mut records,
            unit,
        } = staged;

        let receipt = self.store.run_atomic(unit)?;
        for record in records.iter_mut() {
            receipt.stamp(record);
        }

        let refreshed = self.store.records::<T>().get_many(
            context
                .existing_records
                .iter()
                .map(|r| r.id().to_string()),
        )?;

        let mut created = Vec::new();
        let mut updated = Vec::new();
        for record in &records {
            match context.existing(record.id()) {
                Some(old) => {
                    let new = refreshed
                        .get(record.id())
                        .cloned()
                        .unwrap_or_else(|| record.clone());
                    updated.push((old.clone(), new));
                }
                None => created.push(record.clone()),
            }
        }

        debug!(
            collection = T::COLLECTION,
            created = created.len(),
            updated = updated.len(),
            "batch committed"
        );
        Ok(CommittedBatch {
            records,
            created,
            updated,
            receipt,
        })
    }

    pub(crate) fn create_many<F>(&self, records: Vec<T>, upsert: bool, prepare: F) -> Result<Vec<T>>
    where
        F: FnOnce(&mut [T]) -> Result<()>,
    {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let staged = self.stage_batch(records, upsert, prepare)?;
        let committed = self.commit_batch(staged)?;
        self.events
            .publish_batch(&committed.created, &committed.updated);
        Ok(committed.records)
    }

    /// `new` with refreshed metadata, or `None` when it only restates `old`.
    pub(crate) fn prepare_replace(&self, old: &T, mut new: T) -> Option<T> {
        if equals_ignoring_metadata(old, &new) {
            debug!(collection = T::COLLECTION, id = %old.id(), "replacement unchanged, skipping");
            return None;
        }
        new.set_metadata(Metadata::updated_from(old.metadata()));
        Some(new)
    }

    /// Version-checked update of `old` to `new`, skipped when nothing changes.
    pub(crate) fn replace(&self, old: &T, new: T) -> Result<Outcome<T>> {
        let Some(mut new) = self.prepare_replace(old, new) else {
            return Ok(Outcome::NoContent);
        };

        let mut unit = UnitOfWork::new();
        unit.update(&new, new.version())?;
        let receipt = self.store.run_atomic(unit)?;
        receipt.stamp(&mut new);
        debug!(collection = T::COLLECTION, id = %new.id(), "record replaced");

        self.events.publish_updated(old, &new);
        Ok(Outcome::Record(new))
    }

    pub(crate) fn delete_one(&self, id: &str) -> Result<T> {
        let record = self.fetch(id)?;
        let mut unit = UnitOfWork::new();
        unit.delete::<T>(id);
        self.store.run_atomic(unit)?;
        debug!(collection = T::COLLECTION, id = %id, "record deleted");

        self.events.publish_removed(&record);
        Ok(record)
    }

    /// Delete what `cql` selects and return the number of rows removed.
    ///
    /// A match-all query clears the collection and `dependents` with a single
    /// `DELETE_ALL` event instead of one event per record.
    pub(crate) fn delete_by_cql(&self, cql: &str, dependents: &[String]) -> Result<usize> {
        let query = CqlQuery::parse(cql)?;
        let mut unit = UnitOfWork::new();

        if matches!(query, CqlQuery::MatchAll) {
            unit.delete_all(T::COLLECTION);
            for collection in dependents {
                unit.delete_all(collection.clone());
            }
            let receipt = self.store.run_atomic(unit)?;
            info!(collection = T::COLLECTION, deleted = receipt.deleted, "all records deleted");
            self.events.publish_all_removed();
            return Ok(receipt.deleted);
        }

        let doomed = self
            .store
            .records::<T>()
            .find(&|record: &T| query.matches(record))?;
        if doomed.is_empty() {
            return Ok(0);
        }
        for record in &doomed {
            unit.delete::<T>(record.id());
        }
        let receipt = self.store.run_atomic(unit)?;
        info!(collection = T::COLLECTION, deleted = receipt.deleted, query = %cql, "records deleted");

        self.events.publish_removed_all_of(&doomed);
        Ok(receipt.deleted)
    }

    /// Re-announce every stored record with back-pressure.
    pub(crate) fn reindex<F>(&self, on_progress: F) -> std::result::Result<usize, StreamAborted>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let records = self
            .store
            .records::<T>()
            .find(&|_| true)
            .map_err(|err| StreamAborted {
                published: 0,
                source: err.into(),
            })?;
        self.events
            .publish_stream(records.into_iter().map(Ok), DomainEventType::Reindex, on_progress)
    }
}

/// The three pipelines wired to one store, broker and failure log.
pub struct Inventory<S> {
    items: ItemService<S>,
    holdings: HoldingsService<S>,
    instances: InstanceService<S>,
    hrids: HridManager<S>,
    failures: FailureLog<S>,
    config: InventoryConfig,
}

impl<S: RecordStore + Clone + 'static> Inventory<S> {
    pub fn new(store: S, broker: Arc<dyn Broker>, config: InventoryConfig) -> Self {
        let failures = FailureLog::new(store.clone());
        let handler: Arc<dyn FailureHandler> = Arc::new(failures.clone());

        Inventory {
            items: ItemService::new(store.clone(), broker.clone(), handler.clone(), &config),
            holdings: HoldingsService::new(store.clone(), broker.clone(), handler.clone(), &config),
            instances: InstanceService::new(store.clone(), broker, handler, &config),
            hrids: HridManager::new(store),
            failures,
            config,
        }
    }

    pub fn items(&self) -> &ItemService<S> {
        &self.items
    }

    pub fn holdings(&self) -> &HoldingsService<S> {
        &self.holdings
    }

    pub fn instances(&self) -> &InstanceService<S> {
        &self.instances
    }

    pub fn hrids(&self) -> &HridManager<S> {
        &self.hrids
    }

    pub fn failures(&self) -> &FailureLog<S> {
        &self.failures
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistical_codes_must_be_uuids() {
        assert!(validate_statistical_codes(&[]).is_ok());
        assert!(
            validate_statistical_codes(&["b5968c9e-cddc-4576-99e3-8e60aed8b0dd".to_string()])
                .is_ok()
        );

        let err = validate_statistical_codes(&["not-a-uuid".to_string()]).unwrap_err();
        assert_eq!(err.failures()[0].field, "statisticalCodeIds");
        assert_eq!(err.failures()[0].message, "invalid UUID format of statistical code");
        assert_eq!(err.failures()[0].value.as_deref(), Some("not-a-uuid"));
    }

    #[test]
    fn hrid_may_only_change_on_consortium_copies() {
        let old = Instance {
            hrid: Some("in00000000001".into()),
            ..Instance::new("i-1", "A")
        };
        let renamed = Instance {
            hrid: Some("in00000000099".into()),
            ..old.clone()
        };
        assert!(check_hrid_unchanged(&old, &old.clone()).is_ok());
        assert_eq!(
            check_hrid_unchanged(&old, &renamed).unwrap_err().to_string(),
            "The hrid field cannot be changed: new=in00000000099, old=in00000000001"
        );

        let shadow = Instance {
            source: Some("CONSORTIUM-MARC".into()),
            ..renamed
        };
        assert!(check_hrid_unchanged(&old, &shadow).is_ok());
    }

    #[test]
    fn item_hrid_never_changes() {
        let old = Item {
            hrid: Some("it1".into()),
            ..Item::new("it-1", "h-1")
        };
        let new = Item {
            hrid: None,
            ..old.clone()
        };
        assert!(check_hrid_unchanged(&old, &new).is_err());
    }

    #[test]
    fn outcome_accessors() {
        assert_eq!(Outcome::Record(3).into_record(), Some(3));
        assert!(Outcome::<i32>::NoContent.is_no_content());
    }
}
