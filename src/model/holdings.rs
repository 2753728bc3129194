use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ForeignKey, Instance, Metadata, Record};

/// Holdings of one instance at a location; items inherit its location and call number.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrid: Option<String>,
    #[serde(default)]
    pub instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_location_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_number_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_number_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_number_type_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_suppress: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statistical_code_ids: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HoldingsRecord {
    pub fn new(id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        HoldingsRecord {
            id: id.into(),
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    /// True when a change from `other` alters the effective values of items
    /// or the instance they are announced under.
    pub fn affects_items(&self, other: &HoldingsRecord) -> bool {
        self.instance_id != other.instance_id
            || self.permanent_location_id != other.permanent_location_id
            || self.temporary_location_id != other.temporary_location_id
            || self.call_number != other.call_number
            || self.call_number_prefix != other.call_number_prefix
            || self.call_number_suffix != other.call_number_suffix
            || self.call_number_type_id != other.call_number_type_id
    }
}

impl Record for HoldingsRecord {
    const COLLECTION: &'static str = "holdings_record";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn version(&self) -> Option<i64> {
        self.version
    }

    fn set_version(&mut self, version: Option<i64>) {
        self.version = version;
    }

    fn hrid(&self) -> Option<&str> {
        self.hrid.as_deref()
    }

    fn set_hrid(&mut self, hrid: String) {
        self.hrid = Some(hrid);
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = Some(metadata);
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey {
            field: "instanceId",
            collection: Instance::COLLECTION,
            value: self.instance_id.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_change_affects_items() {
        let before = HoldingsRecord::new("h-1", "i-1");
        let mut after = before.clone();
        assert!(!after.affects_items(&before));

        after.discovery_suppress = Some(true);
        assert!(!after.affects_items(&before));

        after.temporary_location_id = Some("loc-2".into());
        assert!(after.affects_items(&before));
    }

    #[test]
    fn instance_change_affects_items() {
        let before = HoldingsRecord::new("h-1", "i-1");
        let after = HoldingsRecord::new("h-1", "i-2");
        assert!(after.affects_items(&before));
    }
}
