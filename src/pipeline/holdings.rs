use std::sync::Arc;

use tracing::debug;

use super::{check_hrid_unchanged, validate_statistical_codes, Outcome, Pipeline};
use crate::config::InventoryConfig;
use crate::effective;
use crate::error::Result;
use crate::events::{Broker, DomainEventPublisher, FailureHandler, StreamAborted};
use crate::model::{HoldingsRecord, Item, Metadata};
use crate::store::{CommitReceipt, RecordStore, RecordsExt, UnitOfWork};

fn non_empty(id: &str) -> Option<&str> {
    Some(id).filter(|id| !id.is_empty())
}

/// Item changes caused by one holdings record, with the instance it
/// belonged to before and after.
struct ItemCascade {
    old_instance_id: String,
    new_instance_id: String,
    items: Vec<(Item, Item)>,
}

impl ItemCascade {
    fn moved(&self) -> bool {
        self.old_instance_id != self.new_instance_id
    }

    fn stamp(&mut self, receipt: &CommitReceipt) {
        for (_, item) in self.items.iter_mut() {
            receipt.stamp(item);
        }
    }
}

/// Create, replace and delete holdings records, keeping their items'
/// effective values in step.
pub struct HoldingsService<S> {
    pipeline: Pipeline<HoldingsRecord, S>,
    item_events: DomainEventPublisher<Item, S>,
}

impl<S: RecordStore + Clone> HoldingsService<S> {
    pub fn new(
        store: S,
        broker: Arc<dyn Broker>,
        failures: Arc<dyn FailureHandler>,
        config: &InventoryConfig,
    ) -> Self {
        HoldingsService {
            item_events: DomainEventPublisher::new(
                store.clone(),
                broker.clone(),
                failures.clone(),
                config,
            ),
            pipeline: Pipeline::new(store, broker, failures, config),
        }
    }

    pub fn get_holdings(&self, id: &str) -> Result<HoldingsRecord> {
        self.pipeline.fetch(id)
    }

    /// Stage item updates for every item whose effective values follow one
    /// of the `(old, new)` holdings. Items of a holdings record that moved to
    /// another instance are announced even when nothing about them is written.
    fn stage_cascade(
        &self,
        holdings: &[(&HoldingsRecord, &HoldingsRecord)],
        unit: &mut UnitOfWork,
    ) -> Result<Vec<ItemCascade>> {
        if holdings.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = holdings.iter().map(|(_, h)| h.id.as_str()).collect();
        let items = self
            .pipeline
            .store
            .records::<Item>()
            .find(&|item: &Item| ids.contains(&item.holdings_record_id.as_str()))?;

        let mut cascades = Vec::with_capacity(holdings.len());
        for (old_parent, parent) in holdings {
            let mut pairs = Vec::new();
            for (old, mut new) in effective::cascade(parent, &items) {
                new.metadata = Some(Metadata::updated_from(old.metadata.as_ref()));
                unit.update(&new, old.version)?;
                pairs.push((old, new));
            }

            let mut cascade = ItemCascade {
                old_instance_id: old_parent.instance_id.clone(),
                new_instance_id: parent.instance_id.clone(),
                items: pairs,
            };
            if cascade.moved() {
                let untouched: Vec<&Item> = items
                    .iter()
                    .filter(|item| item.belongs_to(parent))
                    .filter(|item| !cascade.items.iter().any(|(old, _)| old.id == item.id))
                    .collect();
                for item in untouched {
                    cascade.items.push((item.clone(), item.clone()));
                }
            }
            cascades.push(cascade);
        }
        debug!(
            holdings = holdings.len(),
            items = cascades.iter().map(|c| c.items.len()).sum::<usize>(),
            "cascade staged"
        );
        Ok(cascades)
    }

    fn publish_cascades(&self, cascades: &[ItemCascade]) {
        for cascade in cascades {
            self.item_events.publish_updated_between(
                &cascade.items,
                non_empty(&cascade.old_instance_id),
                non_empty(&cascade.new_instance_id),
            );
        }
    }

    pub fn create_holdings(&self, holdings: HoldingsRecord) -> Result<Outcome<HoldingsRecord>> {
        let created = self.pipeline.create_one(holdings, |h| {
            effective::populate_holdings(h);
            Ok(())
        })?;
        Ok(Outcome::Record(created))
    }

    /// Batch create. Upserted holdings cascade to their items in the same unit.
    pub fn create_holdings_batch(
        &self,
        records: Vec<HoldingsRecord>,
        upsert: Option<bool>,
    ) -> Result<Outcome<Vec<HoldingsRecord>>> {
        if records.is_empty() {
            return Ok(Outcome::Record(Vec::new()));
        }
        let upsert = upsert.unwrap_or(self.pipeline.config.upsert_by_default);

        let mut staged = self.pipeline.stage_batch(records, upsert, |batch| {
            batch.iter_mut().for_each(effective::populate_holdings);
            Ok(())
        })?;

        let changed: Vec<(&HoldingsRecord, &HoldingsRecord)> = staged
            .records
            .iter()
            .filter_map(|h| {
                staged
                    .context
                    .existing(&h.id)
                    .filter(|old| h.affects_items(old))
                    .map(|old| (old, h))
            })
            .collect();
        let mut cascades = self.stage_cascade(&changed, &mut staged.unit)?;

        let committed = self.pipeline.commit_batch(staged)?;
        for cascade in cascades.iter_mut() {
            cascade.stamp(&committed.receipt);
        }

        self.pipeline
            .events
            .publish_batch(&committed.created, &committed.updated);
        self.publish_cascades(&cascades);
        Ok(Outcome::Record(committed.records))
    }

    /// Full replace. A missing id is created instead.
    pub fn update_holdings(
        &self,
        id: &str,
        mut holdings: HoldingsRecord,
    ) -> Result<Outcome<HoldingsRecord>> {
        holdings.id = id.to_string();
        validate_statistical_codes(&holdings.statistical_code_ids)?;

        let Some(old) = self.pipeline.store.records::<HoldingsRecord>().get(id)? else {
            debug!(id = %id, "holdings not found, creating");
            return self.create_holdings(holdings);
        };

        check_hrid_unchanged(&old, &holdings)?;
        effective::populate_holdings(&mut holdings);
        let Some(mut new) = self.pipeline.prepare_replace(&old, holdings) else {
            return Ok(Outcome::NoContent);
        };

        let mut unit = UnitOfWork::new();
        unit.update(&new, new.version)?;
        let mut cascades = if new.affects_items(&old) {
            self.stage_cascade(&[(&old, &new)], &mut unit)?
        } else {
            Vec::new()
        };

        let receipt = self.pipeline.store.run_atomic(unit)?;
        receipt.stamp(&mut new);
        for cascade in cascades.iter_mut() {
            cascade.stamp(&receipt);
        }

        self.pipeline.events.publish_updated(&old, &new);
        self.publish_cascades(&cascades);
        Ok(Outcome::Record(new))
    }

    pub fn delete_holdings(&self, id: &str) -> Result<Outcome<HoldingsRecord>> {
        self.pipeline.delete_one(id)?;
        Ok(Outcome::NoContent)
    }

    pub fn delete_holdings_by_cql(&self, cql: &str) -> Result<Outcome<HoldingsRecord>> {
        self.pipeline.delete_by_cql(cql, &[])?;
        Ok(Outcome::NoContent)
    }

    pub fn reindex<F>(&self, on_progress: F) -> std::result::Result<usize, StreamAborted>
    where
        F: FnMut(usize) -> Result<()>,
    {
        self.pipeline.reindex(on_progress)
    }
}
