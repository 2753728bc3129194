//! HRID allocation.
//!
//! Human readable identifiers come from one database sequence per record
//! kind and are formatted as `prefix + number`. A whole batch of values is
//! reserved with a single sequence call.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{InventoryError, Result};
use crate::model::{is_blank, Record};
use crate::store::{RecordStore, RecordsExt, UnitOfWork};

/// Fixed id of the single settings row.
pub const HRID_SETTINGS_ID: &str = "a501f2a8-5b31-48b2-874d-2191e48db8cd";

const PADDED_WIDTH: usize = 11;

/// Record kinds that receive HRIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HridKind {
    Instances,
    Holdings,
    Items,
}

impl HridKind {
    pub const ALL: [HridKind; 3] = [HridKind::Instances, HridKind::Holdings, HridKind::Items];

    pub fn sequence_name(self) -> &'static str {
        match self {
            HridKind::Instances => "hrid_instances_seq",
            HridKind::Holdings => "hrid_holdings_seq",
            HridKind::Items => "hrid_items_seq",
        }
    }

    fn default_prefix(self) -> &'static str {
        match self {
            HridKind::Instances => "in",
            HridKind::Holdings => "ho",
            HridKind::Items => "it",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HridSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub start_number: i64,
}

impl HridSetting {
    pub fn new(prefix: impl Into<String>, start_number: i64) -> Self {
        HridSetting {
            prefix: Some(prefix.into()),
            start_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HridSettings {
    pub id: String,
    pub instances: HridSetting,
    pub holdings: HridSetting,
    pub items: HridSetting,
    #[serde(default = "default_retain_leading_zeroes")]
    pub common_retain_leading_zeroes: bool,
}

fn default_retain_leading_zeroes() -> bool {
    true
}

impl Default for HridSettings {
    fn default() -> Self {
        HridSettings {
            id: HRID_SETTINGS_ID.into(),
            instances: HridSetting::new(HridKind::Instances.default_prefix(), 1),
            holdings: HridSetting::new(HridKind::Holdings.default_prefix(), 1),
            items: HridSetting::new(HridKind::Items.default_prefix(), 1),
            common_retain_leading_zeroes: true,
        }
    }
}

impl HridSettings {
    pub fn setting(&self, kind: HridKind) -> &HridSetting {
        match kind {
            HridKind::Instances => &self.instances,
            HridKind::Holdings => &self.holdings,
            HridKind::Items => &self.items,
        }
    }

    pub fn setting_mut(&mut self, kind: HridKind) -> &mut HridSetting {
        match kind {
            HridKind::Instances => &mut self.instances,
            HridKind::Holdings => &mut self.holdings,
            HridKind::Items => &mut self.items,
        }
    }

    /// `prefix` followed by the number, zero padded to 11 digits when configured.
    pub fn format(&self, kind: HridKind, value: i64) -> String {
        let prefix = self.setting(kind).prefix.as_deref().unwrap_or("");
        let value = value.max(0);
        if self.common_retain_leading_zeroes {
            format!("{}{:0width$}", prefix, value, width = PADDED_WIDTH)
        } else {
            format!("{}{}", prefix, value)
        }
    }
}

impl Record for HridSettings {
    const COLLECTION: &'static str = "hrid_settings";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Allocates and formats HRIDs, and owns their settings.
#[derive(Clone)]
pub struct HridManager<S> {
    store: S,
}

impl<S: RecordStore> HridManager<S> {
    pub fn new(store: S) -> Self {
        HridManager { store }
    }

    /// Stored settings, or the defaults when none were saved yet.
    pub fn settings(&self) -> Result<HridSettings> {
        Ok(self
            .store
            .records::<HridSettings>()
            .get(HRID_SETTINGS_ID)?
            .unwrap_or_default())
    }

    /// Persist new settings and restart every sequence whose start number changed.
    ///
    /// The settings row and the sequence restarts commit together.
    pub fn update_settings(&self, mut settings: HridSettings) -> Result<()> {
        let existing = self.settings()?;
        settings.id = existing.id.clone();

        for kind in HridKind::ALL {
            if settings.setting(kind).start_number < 1 {
                return Err(InventoryError::validation(
                    "startNumber",
                    format!(
                        "Start number must be positive: {}",
                        settings.setting(kind).start_number
                    ),
                ));
            }
        }

        let mut unit = UnitOfWork::new();
        unit.upsert(&settings)?;
        for kind in HridKind::ALL {
            let start = settings.setting(kind).start_number;
            if existing.setting(kind).start_number != start {
                unit.reset_sequence(kind.sequence_name(), start);
            }
        }

        self.store.run_atomic(unit)?;
        info!(
            instances = ?settings.instances,
            holdings = ?settings.holdings,
            items = ?settings.items,
            "HRID settings updated"
        );
        Ok(())
    }

    /// Reserve and format `count` HRIDs with one sequence call.
    pub fn allocate_next(&self, kind: HridKind, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let settings = self.settings()?;
        self.allocate_with(&settings, kind, count)
    }

    fn allocate_with(
        &self,
        settings: &HridSettings,
        kind: HridKind,
        count: usize,
    ) -> Result<Vec<String>> {
        let values = self
            .store
            .allocate_sequence_values(kind.sequence_name(), count)?;
        if values.len() != count {
            return Err(InventoryError::Internal(format!(
                "sequence {} returned {} values, expected {}",
                kind.sequence_name(),
                values.len(),
                count
            )));
        }
        Ok(values
            .into_iter()
            .map(|value| settings.format(kind, value))
            .collect())
    }

    /// Give every record with a blank HRID the next one, in input order.
    pub fn populate<T: Record>(&self, kind: HridKind, records: &mut [T]) -> Result<()> {
        let missing = records.iter().filter(|r| is_blank(r.hrid())).count();
        if missing == 0 {
            return Ok(());
        }

        let mut hrids = self.allocate_next(kind, missing)?.into_iter();
        for record in records.iter_mut().filter(|r| is_blank(r.hrid())) {
            if let Some(hrid) = hrids.next() {
                record.set_hrid(hrid);
            }
        }
        debug!(kind = ?kind, assigned = missing, "HRIDs populated");
        Ok(())
    }
}
