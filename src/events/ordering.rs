//! Ordering keys - every event is keyed by the owning instance id so one
//! partition sees an instance and all of its holdings and items in order.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{HoldingsRecord, Instance, Item, Record};
use crate::store::{ModelError, RecordStore, RecordsExt};

/// A record type that can be announced on the broker.
pub trait EventSource: Record {
    /// Last topic segment, e.g. `item`.
    const ENTITY: &'static str;

    /// What goes into the `old`/`new` slots of an event.
    type Payload: Serialize;

    /// Owning instance id of each record, in input order, with at most one
    /// store round trip. `None` when the owner cannot be determined.
    fn instance_ids<S: RecordStore>(
        store: &S,
        records: &[&Self],
    ) -> Result<Vec<Option<String>>, ModelError>;

    fn payload(&self, instance_id: Option<&str>) -> Self::Payload;
}

impl EventSource for Instance {
    const ENTITY: &'static str = "instance";
    type Payload = Instance;

    fn instance_ids<S: RecordStore>(
        _store: &S,
        records: &[&Self],
    ) -> Result<Vec<Option<String>>, ModelError> {
        Ok(records.iter().map(|r| Some(r.id.clone())).collect())
    }

    fn payload(&self, _instance_id: Option<&str>) -> Instance {
        self.clone()
    }
}

impl EventSource for HoldingsRecord {
    const ENTITY: &'static str = "holdings-record";
    type Payload = HoldingsRecord;

    fn instance_ids<S: RecordStore>(
        _store: &S,
        records: &[&Self],
    ) -> Result<Vec<Option<String>>, ModelError> {
        Ok(records
            .iter()
            .map(|r| Some(r.instance_id.clone()).filter(|id| !id.is_empty()))
            .collect())
    }

    fn payload(&self, _instance_id: Option<&str>) -> HoldingsRecord {
        self.clone()
    }
}

/// An item as announced: the stored item plus the id of its instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWithInstanceId {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl EventSource for Item {
    const ENTITY: &'static str = "item";
    type Payload = ItemWithInstanceId;

    fn instance_ids<S: RecordStore>(
        store: &S,
        records: &[&Self],
    ) -> Result<Vec<Option<String>>, ModelError> {
        let holdings: HashMap<String, HoldingsRecord> = store
            .records::<HoldingsRecord>()
            .get_many(records.iter().map(|r| r.holdings_record_id.clone()))?;

        Ok(records
            .iter()
            .map(|r| {
                holdings
                    .get(&r.holdings_record_id)
                    .map(|h| h.instance_id.clone())
            })
            .collect())
    }

    fn payload(&self, instance_id: Option<&str>) -> ItemWithInstanceId {
        ItemWithInstanceId {
            item: self.clone(),
            instance_id: instance_id.map(str::to_string),
        }
    }
}
