use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    CirculationNote, EffectiveCallNumberComponents, ForeignKey, HoldingsRecord, ItemStatus,
    Metadata, Note, Record,
};

/// A physical piece attached to a holdings record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrid: Option<String>,
    #[serde(default)]
    pub holdings_record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_location_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_level_call_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_level_call_number_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_level_call_number_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_level_call_number_type_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chronology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_loan_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub circulation_notes: Vec<CirculationNote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statistical_code_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_suppress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_call_number_components: Option<EffectiveCallNumberComponents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_shelving_order: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Properties this crate does not interpret; kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>, holdings_record_id: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            holdings_record_id: holdings_record_id.into(),
            ..Default::default()
        }
    }

    pub fn belongs_to(&self, holdings: &HoldingsRecord) -> bool {
        self.holdings_record_id == holdings.id
    }

    /// Gives every circulation note without an id a fresh one.
    pub fn assign_circulation_note_ids(&mut self) {
        for note in &mut self.circulation_notes {
            if note.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                note.id = Some(uuid::Uuid::new_v4().to_string());
            }
        }
    }
}

impl Record for Item {
    const COLLECTION: &'static str = "item";

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
            field: "holdingsRecordId",
            collection: HoldingsRecord::COLLECTION,
            value: self.holdings_record_id.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_properties_survive_round_trip() {
        let raw = json!({
            "id": "item-1",
            "holdingsRecordId": "h-1",
            "_version": 3,
            "yearCaption": ["1999"],
        });

        let item: Item = serde_json::from_value(raw).unwrap();
        assert_eq!(item.version, Some(3));
        assert_eq!(item.extra.get("yearCaption"), Some(&json!(["1999"])));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["yearCaption"], json!(["1999"]));
        assert_eq!(back["_version"], json!(3));
    }

    #[test]
    fn circulation_note_ids_assigned_once() {
        let mut item = Item::new("item-1", "h-1");
        item.circulation_notes = vec![
            CirculationNote {
                id: Some("existing".into()),
                ..Default::default()
            },
            CirculationNote::default(),
        ];

        item.assign_circulation_note_ids();
        assert_eq!(item.circulation_notes[0].id.as_deref(), Some("existing"));
        let generated = item.circulation_notes[1].id.clone().unwrap();

        item.assign_circulation_note_ids();
        assert_eq!(item.circulation_notes[1].id.as_deref(), Some(generated.as_str()));
    }
}
