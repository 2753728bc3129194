use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{check_hrid_unchanged, validate_statistical_codes, Outcome, Pipeline};
use crate::config::InventoryConfig;
use crate::effective;
use crate::error::{InventoryError, Result, ValidationFailure};
use crate::events::{Broker, FailureHandler, StreamAborted};
use crate::model::{now_iso, HoldingsRecord, Item};
use crate::patch::{merge_repeated, PatchData, PatchRequest};
use crate::store::{RecordStore, RecordsExt, UnitOfWork};

const HOLDINGS_RECORD_ID: &str = "holdingsRecordId";

/// Status date, effective values and circulation note ids of a new item.
fn prepare_new_item(item: &mut Item, holdings: Option<&HoldingsRecord>) -> Result<()> {
    let Some(holdings) = holdings else {
        return Err(InventoryError::Validation(vec![ValidationFailure::new(
            HOLDINGS_RECORD_ID,
            "Holdings record does not exist",
        )
        .with_value(item.holdings_record_id.clone())]));
    };

    if let Some(status) = item.status.as_mut() {
        if status.date.is_none() {
            status.date = Some(now_iso());
        }
    }
    effective::populate(item, Some(holdings));
    item.assign_circulation_note_ids();
    Ok(())
}

/// A renamed status gets a fresh date, otherwise the stored date is kept.
fn carry_status_date(old: &Item, new: &mut Item) {
    if let Some(status) = new.status.as_mut() {
        match old.status.as_ref() {
            Some(previous) if previous.name == status.name => {
                status.date = previous.date.clone();
            }
            _ => status.date = Some(now_iso()),
        }
    }
}

fn items_not_found(missing: &[&str]) -> InventoryError {
    match missing {
        [id] => InventoryError::NotFound(format!("Item not found in database: {}", id)),
        ids => InventoryError::NotFound(format!("Items not found in database: {}", ids.join(", "))),
    }
}

/// Create, replace, patch and delete items.
pub struct ItemService<S> {
    pipeline: Pipeline<Item, S>,
}

impl<S: RecordStore + Clone> ItemService<S> {
    pub fn new(
        store: S,
        broker: Arc<dyn Broker>,
        failures: Arc<dyn FailureHandler>,
        config: &InventoryConfig,
    ) -> Self {
        ItemService {
            pipeline: Pipeline::new(store, broker, failures, config),
        }
    }

    pub fn get_item(&self, id: &str) -> Result<Item> {
        self.pipeline.fetch(id)
    }

    pub fn create_item(&self, item: Item) -> Result<Outcome<Item>> {
        let store = &self.pipeline.store;
        let created = self.pipeline.create_one(item, |item| {
            let holdings = store
                .records::<HoldingsRecord>()
                .get(&item.holdings_record_id)?;
            prepare_new_item(item, holdings.as_ref())
        })?;
        Ok(Outcome::Record(created))
    }

    /// Create many items at once; `upsert` defaults to the configured behaviour.
    pub fn create_items(&self, items: Vec<Item>, upsert: Option<bool>) -> Result<Outcome<Vec<Item>>> {
        let upsert = upsert.unwrap_or(self.pipeline.config.upsert_by_default);
        let store = &self.pipeline.store;
        debug!(count = items.len(), upsert, "creating items");

        let created = self.pipeline.create_many(items, upsert, |items| {
            let holdings: HashMap<String, HoldingsRecord> = store
                .records::<HoldingsRecord>()
                .get_many(items.iter().map(|i| i.holdings_record_id.clone()))?;
            for item in items.iter_mut() {
                let parent = holdings.get(&item.holdings_record_id);
                prepare_new_item(item, parent)?;
            }
            Ok(())
        })?;
        Ok(Outcome::Record(created))
    }

    /// Full replace. Unchanged items are not written and not announced.
    pub fn update_item(&self, id: &str, mut item: Item) -> Result<Outcome<Item>> {
        item.id = id.to_string();
        validate_statistical_codes(&item.statistical_code_ids)?;
        item.assign_circulation_note_ids();

        let old = self.pipeline.fetch(id)?;
        let holdings = self
            .pipeline
            .store
            .records::<HoldingsRecord>()
            .get(&item.holdings_record_id)?
            .ok_or_else(|| {
                InventoryError::Validation(vec![ValidationFailure::new(
                    HOLDINGS_RECORD_ID,
                    format!("holdingsRecordId not found: {}", item.holdings_record_id),
                )
                .with_value(item.holdings_record_id.clone())])
            })?;

        check_hrid_unchanged(&old, &item)?;
        carry_status_date(&old, &mut item);
        effective::populate(&mut item, Some(&holdings));

        self.pipeline.replace(&old, item)
    }

    /// Apply sparse changes to many items in one atomic unit.
    ///
    /// Reads all items in one round trip and all current and target holdings
    /// in a second. Repeated ids are merged into one patch, later values
    /// winning. Patches that change nothing are dropped; when none remain
    /// nothing is written or announced.
    pub fn patch_items(&self, requests: Vec<PatchRequest>) -> Result<Outcome<Vec<Item>>> {
        if requests.is_empty() {
            return Err(InventoryError::validation(
                "items",
                "Expected at least one item to update",
            ));
        }
        self.pipeline.config.check_batch_size(requests.len())?;

        let mut requests = merge_repeated(requests);
        for request in requests.iter_mut() {
            request.strip_read_only();
            request.validate_required()?;
            request.normalize()?;
        }

        let store = &self.pipeline.store;
        let items = store
            .records::<Item>()
            .get_many(requests.iter().map(|r| r.id.clone()))?;

        let mut missing: Vec<&str> = Vec::new();
        for request in &requests {
            if !items.contains_key(&request.id) && !missing.contains(&request.id.as_str()) {
                missing.push(&request.id);
            }
        }
        if !missing.is_empty() {
            return Err(items_not_found(&missing));
        }

        let holdings_ids: Vec<String> = items
            .values()
            .map(|item| item.holdings_record_id.clone())
            .chain(
                requests
                    .iter()
                    .filter_map(|r| r.holdings_record_id().map(str::to_string)),
            )
            .collect();
        let holdings = store.records::<HoldingsRecord>().get_many(holdings_ids)?;

        let mut changed = Vec::new();
        for request in requests {
            let old = items
                .get(&request.id)
                .cloned()
                .ok_or_else(|| items_not_found(&[request.id.as_str()]))?;
            let target = request
                .holdings_record_id()
                .map(str::to_string)
                .unwrap_or_else(|| old.holdings_record_id.clone());
            let new_holdings = holdings
                .get(&target)
                .ok_or_else(|| InventoryError::NotFound(format!("Holdings not found: {}", target)))?;

            let patch = PatchData::build(old, Some(new_holdings), request)?;
            validate_statistical_codes(&patch.new_item().statistical_code_ids)?;
            if patch.is_changed() {
                changed.push(patch);
            }
        }

        if changed.is_empty() {
            debug!("no item patch changes anything, skipping update");
            return Ok(Outcome::NoContent);
        }

        let mut unit = UnitOfWork::new();
        for patch in &changed {
            unit.update(patch.new_item(), patch.patch_request().version)?;
        }
        let receipt = store.run_atomic(unit)?;

        let pairs: Vec<(Item, Item)> = changed
            .into_iter()
            .map(|patch| {
                let (old, mut new) = patch.into_items();
                receipt.stamp(&mut new);
                (old, new)
            })
            .collect();
        debug!(updated = pairs.len(), "items patched");

        self.pipeline.events.publish_batch(&[], &pairs);
        Ok(Outcome::NoContent)
    }

    pub fn delete_item(&self, id: &str) -> Result<Outcome<Item>> {
        self.pipeline.delete_one(id)?;
        Ok(Outcome::NoContent)
    }

    pub fn delete_items(&self, cql: &str) -> Result<Outcome<Item>> {
        self.pipeline.delete_by_cql(cql, &[])?;
        Ok(Outcome::NoContent)
    }

    /// Send a `REINDEX` event for every stored item.
    pub fn reindex<F>(&self, on_progress: F) -> std::result::Result<usize, StreamAborted>
    where
        F: FnMut(usize) -> Result<()>,
    {
        self.pipeline.reindex(on_progress)
    }
}
