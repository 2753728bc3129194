//! Partial item updates.
//!
//! A [`PatchRequest`] names an item and carries only the properties to change.
//! [`PatchData`] is the immutable result of checking one request against the
//! stored item and its holdings: the merged item, the request as it will be
//! persisted, and whether anything actually changes.

mod normalize;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::effective;
use crate::error::{InventoryError, Result, ValidationFailure};
use crate::model::{now_iso, HoldingsRecord, Item, Metadata};

/// Server-maintained or derived properties a client may not set.
pub const READ_ONLY_FIELDS: [&str; 8] = [
    "permanentLocation",
    "temporaryLocation",
    "effectiveLocationId",
    "effectiveShelvingOrder",
    "effectiveCallNumberComponents",
    "holdingsRecord2",
    "metadata",
    "materialType",
];

/// Properties a patch may change but never clear.
pub const REQUIRED_FIELDS: [&str; 3] = ["materialTypeId", "permanentLoanTypeId", "holdingsRecordId"];

const HOLDINGS_RECORD_ID: &str = "holdingsRecordId";
const HRID: &str = "hrid";
const STATUS: &str = "status";

fn blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// One entry of a batch patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(flatten)]
    pub additional_properties: Map<String, Value>,
}

impl PatchRequest {
    pub fn new(id: impl Into<String>) -> Self {
        PatchRequest {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, property: impl Into<String>, value: Value) -> Self {
        self.additional_properties.insert(property.into(), value);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.additional_properties.is_empty()
    }

    /// Fold a later patch of the same item into this one; its values win.
    pub fn absorb(&mut self, later: PatchRequest) {
        if later.version.is_some() {
            self.version = later.version;
        }
        self.additional_properties.extend(later.additional_properties);
    }

    pub fn strip_read_only(&mut self) {
        for field in READ_ONLY_FIELDS {
            self.additional_properties.remove(field);
        }
    }

    /// Rejects a patch that blanks a required field or the status name.
    pub fn validate_required(&self) -> Result<()> {
        let message = format!("Required fields cannot be removed. ItemId: {}", self.id);
        let mut failures = Vec::new();

        for field in REQUIRED_FIELDS {
            if self.additional_properties.get(field).is_some_and(blank_value) {
                failures.push(
                    ValidationFailure::new(field, message.clone()).with_code("field.required"),
                );
            }
        }

        if let Some(status) = self.additional_properties.get(STATUS) {
            let name_blank = status.get("name").map_or(true, blank_value);
            if status.is_null() || name_blank {
                failures.push(
                    ValidationFailure::new(STATUS, message.clone()).with_code("field.required"),
                );
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(InventoryError::Validation(failures))
        }
    }

    pub fn normalize(&mut self) -> Result<()> {
        normalize::normalize(&mut self.additional_properties)
    }

    /// Only checked when the patch mentions `hrid` at all.
    pub fn check_hrid(&self, old: &Item) -> Result<()> {
        let Some(value) = self.additional_properties.get(HRID) else {
            return Ok(());
        };
        let new = value.as_str();
        if new != old.hrid.as_deref() {
            return Err(InventoryError::validation(
                HRID,
                format!(
                    "The hrid field cannot be changed: new={}, old={}",
                    new.unwrap_or("null"),
                    old.hrid.as_deref().unwrap_or("null")
                ),
            ));
        }
        Ok(())
    }

    /// New holdings id when the patch moves the item.
    pub fn holdings_record_id(&self) -> Option<&str> {
        self.additional_properties
            .get(HOLDINGS_RECORD_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

/// Collapse repeated ids into one request each, in first-seen order.
pub fn merge_repeated(requests: Vec<PatchRequest>) -> Vec<PatchRequest> {
    let mut merged: Vec<PatchRequest> = Vec::with_capacity(requests.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for request in requests {
        match positions.get(&request.id) {
            Some(&at) => merged[at].absorb(request),
            None => {
                positions.insert(request.id.clone(), merged.len());
                merged.push(request);
            }
        }
    }
    merged
}

/// A validated patch merged with the item it applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchData {
    old_item: Item,
    new_item: Item,
    patch_request: PatchRequest,
}

impl PatchData {
    /// Merge `request` over `old_item` and resolve effective values against
    /// `new_holdings`.
    ///
    /// The request must already be stripped, validated and normalized. The
    /// stored request gains the derived effective values and metadata.
    pub fn build(
        old_item: Item,
        new_holdings: Option<&HoldingsRecord>,
        mut patch_request: PatchRequest,
    ) -> Result<Self> {
        patch_request.check_hrid(&old_item)?;

        let mut merged = serde_json::to_value(&old_item)?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in &patch_request.additional_properties {
                fields.insert(key.clone(), value.clone());
            }
        }
        let mut new_item: Item = serde_json::from_value(merged).map_err(|err| {
            InventoryError::validation("", format!("Invalid item format: {}", err))
        })?;
        new_item.id = old_item.id.clone();
        new_item.version = patch_request.version.or(old_item.version);

        if let (Some(old), Some(new)) = (&old_item.status, &mut new_item.status) {
            if !patch_request.has_status_date() {
                new.date = if old.name == new.name {
                    old.date.clone()
                } else {
                    Some(now_iso())
                };
            }
        }

        effective::populate(&mut new_item, new_holdings);
        new_item.assign_circulation_note_ids();
        new_item.metadata = Some(Metadata::updated_from(old_item.metadata.as_ref()));

        transfer_effective_values(&new_item, &mut patch_request.additional_properties)?;

        Ok(PatchData {
            old_item,
            new_item,
            patch_request,
        })
    }

    pub fn old_item(&self) -> &Item {
        &self.old_item
    }

    pub fn new_item(&self) -> &Item {
        &self.new_item
    }

    pub fn patch_request(&self) -> &PatchRequest {
        &self.patch_request
    }

    pub fn into_items(self) -> (Item, Item) {
        (self.old_item, self.new_item)
    }

    /// False when the patch is empty, only restates the current holdings, or
    /// merges into an item equal to the stored one apart from metadata.
    pub fn has_changes(&self) -> Result<bool> {
        let props: Vec<(&String, &Value)> = self
            .patch_request
            .additional_properties
            .iter()
            .filter(|(key, _)| !READ_ONLY_FIELDS.contains(&key.as_str()))
            .collect();

        if props.is_empty() {
            return Ok(false);
        }
        if props.iter().any(|(key, _)| key.as_str() != HOLDINGS_RECORD_ID) {
            return Ok(!equals_ignoring_metadata(&self.old_item, &self.new_item));
        }

        let patched = match props[0].1 {
            Value::Null => None,
            Value::String(id) => Some(id.as_str()),
            other => {
                return Err(InventoryError::validation(
                    HOLDINGS_RECORD_ID,
                    format!("holdingsRecordId must be a string: {}", other),
                ))
            }
        };
        let old = Some(self.old_item.holdings_record_id.as_str());
        Ok(patched.filter(|id| !id.is_empty()) != old.filter(|id| !id.is_empty()))
    }

    /// Like [`has_changes`](Self::has_changes) but counts a failed comparison as a change.
    pub fn is_changed(&self) -> bool {
        self.has_changes().unwrap_or_else(|err| {
            warn!(
                id = %self.new_item.id,
                error = %err,
                "could not compare patch with stored item, including it in the update"
            );
            true
        })
    }
}

impl PatchRequest {
    fn has_status_date(&self) -> bool {
        self.additional_properties
            .get(STATUS)
            .and_then(|status| status.get("date"))
            .is_some_and(|date| !blank_value(date))
    }
}

fn transfer_effective_values(item: &Item, props: &mut Map<String, Value>) -> Result<()> {
    if let Some(location) = &item.effective_location_id {
        props.insert("effectiveLocationId".into(), Value::String(location.clone()));
    }
    if let Some(order) = &item.effective_shelving_order {
        props.insert("effectiveShelvingOrder".into(), Value::String(order.clone()));
    }
    if let Some(components) = item
        .effective_call_number_components
        .as_ref()
        .filter(|c| !c.is_empty())
    {
        props.insert(
            "effectiveCallNumberComponents".into(),
            serde_json::to_value(components)?,
        );
    }
    if let Some(metadata) = &item.metadata {
        props.insert("metadata".into(), serde_json::to_value(metadata)?);
    }
    Ok(())
}

/// Structural equality of two records, ignoring `metadata` and `_version`.
///
/// A record that cannot be serialized compares unequal.
pub fn equals_ignoring_metadata<T: Serialize>(a: &T, b: &T) -> bool {
    fn comparable<T: Serialize>(record: &T) -> Option<Value> {
        let mut value = serde_json::to_value(record).ok()?;
        if let Value::Object(fields) = &mut value {
            fields.remove("metadata");
            fields.remove("_version");
        }
        Some(value)
    }

    match (comparable(a), comparable(b)) {
        (Some(a), Some(b)) => a == b,
        _ => {
            warn!("could not serialize records for comparison, treating them as different");
            false
        }
    }
}
