//! Shelving-order backfill for items stored before the field existed.
//!
//! The run is recorded with a marker row, so upgrading twice to the same
//! version touches nothing the second time.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InventoryConfig;
use crate::effective;
use crate::error::Result;
use crate::model::{HoldingsRecord, Item, Record};
use crate::store::{RecordStore, RecordsExt, UnitOfWork};

/// First module version that stores `effectiveShelvingOrder`.
pub const VERSION_WITH_SHELVING_ORDER: &str = "20.1.0";

const MARKER_ID: &str = "item-shelving-order";

/// Persisted proof that a migration ran.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMarker {
    pub id: String,
    pub module_version: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub migrated: usize,
}

impl Record for MigrationMarker {
    const COLLECTION: &'static str = "migration_marker";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Numeric, component-wise comparison of dotted versions.
///
/// Missing components count as zero and anything after the leading digits
/// of a component (`-SNAPSHOT`) is ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn components(version: &str) -> Vec<u64> {
        version
            .trim()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }

    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Fills in `effectiveShelvingOrder` for items that lack it.
pub struct ShelvingOrderMigration<S> {
    store: S,
    fetch_size: usize,
}

impl<S: RecordStore> ShelvingOrderMigration<S> {
    pub fn new(store: S, config: &InventoryConfig) -> Self {
        ShelvingOrderMigration {
            store,
            fetch_size: config.migration_fetch_size.max(1),
        }
    }

    fn marker(&self) -> Result<Option<MigrationMarker>> {
        Ok(self.store.records::<MigrationMarker>().get(MARKER_ID)?)
    }

    /// Whether an upgrade from `from_module_version` still needs the backfill.
    pub fn is_required(&self, from_module_version: Option<&str>) -> Result<bool> {
        let recorded = self.marker()?.map(|m| m.module_version);
        let from = recorded.as_deref().or(from_module_version);
        Ok(from.map_or(true, |version| {
            compare_versions(version, VERSION_WITH_SHELVING_ORDER) == Ordering::Less
        }))
    }

    /// Run the backfill and return the number of items updated.
    ///
    /// Items are read `fetch_size` at a time; each page is resolved against
    /// its holdings and written in one unit.
    pub fn run(&self, from_module_version: Option<&str>) -> Result<usize> {
        if !self.is_required(from_module_version)? {
            warn!(
                from = from_module_version.unwrap_or("unknown"),
                "shelving order migration not required, skipping"
            );
            return Ok(0);
        }

        info!(from = from_module_version.unwrap_or("unknown"), "shelving order migration started");
        let mut visited: HashSet<String> = HashSet::new();
        let mut migrated = 0usize;

        loop {
            let page = self.store.records::<Item>().find_limited(
                &|item: &Item| item.effective_shelving_order.is_none() && !visited.contains(&item.id),
                self.fetch_size,
            )?;
            if page.is_empty() {
                break;
            }

            let holdings = self
                .store
                .records::<HoldingsRecord>()
                .get_many(page.iter().map(|item| item.holdings_record_id.clone()))?;

            let mut unit = UnitOfWork::new();
            let mut updated = 0usize;
            for item in &page {
                visited.insert(item.id.clone());
                let parent = holdings.get(&item.holdings_record_id);
                if effective::is_stale(item, parent) {
                    unit.update(&effective::resolved(item, parent), item.version)?;
                    updated += 1;
                }
            }
            if !unit.is_empty() {
                self.store.run_atomic(unit)?;
            }
            migrated += updated;
            debug!(read = page.len(), updated, "shelving order page migrated");
        }

        let mut unit = UnitOfWork::new();
        unit.upsert(&MigrationMarker {
            id: MARKER_ID.to_string(),
            module_version: VERSION_WITH_SHELVING_ORDER.to_string(),
            completed_at: Utc::now(),
            migrated,
        })?;
        self.store.run_atomic(unit)?;

        info!(migrated, "shelving order migration completed");
        Ok(migrated)
    }
}
