use std::collections::HashMap;

use crate::model::Record;
use crate::store::{RecordStore, RecordsExt};

/// Split of an incoming batch into new and already stored records.
///
/// `existing_records` holds the stored versions, not the incoming ones.
/// Both lists keep the order of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperationContext<T> {
    pub records_to_be_created: Vec<T>,
    pub existing_records: Vec<T>,
}

impl<T: Record> BatchOperationContext<T> {
    pub fn new(incoming: &[T], mut stored: HashMap<String, T>) -> Self {
        let mut records_to_be_created = Vec::new();
        let mut existing_records = Vec::new();
        for record in incoming {
            match stored.remove(record.id()) {
                Some(old) => existing_records.push(old),
                None => records_to_be_created.push(record.clone()),
            }
        }
        BatchOperationContext {
            records_to_be_created,
            existing_records,
        }
    }

    /// Builds the context with a single multi-key read.
    pub fn load<S: RecordStore>(
        store: &S,
        incoming: &[T],
    ) -> Result<Self, crate::store::ModelError> {
        let stored = store
            .records::<T>()
            .get_many(incoming.iter().map(|r| r.id().to_string()))?;
        Ok(Self::new(incoming, stored))
    }

    pub fn is_existing(&self, id: &str) -> bool {
        self.existing_records.iter().any(|r| r.id() == id)
    }

    pub fn existing(&self, id: &str) -> Option<&T> {
        self.existing_records.iter().find(|r| r.id() == id)
    }
}
