//! Shared fixtures: an in-memory store and broker wired into an [`Inventory`].

#![allow(dead_code)]

use std::sync::Arc;

use inventory_storage::{
    HoldingsRecord, InMemoryRecordStore, Instance, Inventory, InventoryConfig, Item, ItemStatus,
    MemoryBroker, RecordsExt, SentMessage,
};

pub const ENVIRONMENT: &str = "test";
pub const TENANT: &str = "diku";

/// Deterministic v4-shaped uuid for fixtures.
pub fn uuid(n: u32) -> String {
    format!("00000000-0000-4000-8000-{:012}", n)
}

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("inventory_storage=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub store: InMemoryRecordStore,
    pub broker: MemoryBroker,
    pub inventory: Inventory<InMemoryRecordStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(InventoryConfig::new(TENANT).with_environment(ENVIRONMENT))
    }

    pub fn with_config(config: InventoryConfig) -> Self {
        Self::with_broker(config, MemoryBroker::new())
    }

    pub fn with_broker(config: InventoryConfig, broker: MemoryBroker) -> Self {
        init_test_logging();
        let store = InMemoryRecordStore::new();
        let inventory = Inventory::new(store.clone(), Arc::new(broker.clone()), config);
        Harness {
            store,
            broker,
            inventory,
        }
    }

    pub fn topic(&self, entity: &str) -> String {
        format!("{}.{}.inventory.{}", ENVIRONMENT, TENANT, entity)
    }

    /// Messages sent to one entity topic, in order.
    pub fn events(&self, entity: &str) -> Vec<SentMessage> {
        self.broker.sent_to(&self.topic(entity))
    }

    pub fn event_types(&self, entity: &str) -> Vec<String> {
        self.events(entity)
            .iter()
            .filter_map(|m| m.event_type())
            .collect()
    }

    /// Create an instance and forget its event.
    pub fn seed_instance(&self, id: &str) -> Instance {
        let instance = self
            .inventory
            .instances()
            .create_instance(Instance::new(id, format!("Title {}", id)))
            .unwrap()
            .into_record()
            .unwrap();
        self.broker.clear();
        instance
    }

    pub fn seed_holdings(&self, holdings: HoldingsRecord) -> HoldingsRecord {
        let created = self
            .inventory
            .holdings()
            .create_holdings(holdings)
            .unwrap()
            .into_record()
            .unwrap();
        self.broker.clear();
        created
    }

    pub fn seed_item(&self, item: Item) -> Item {
        let created = self
            .inventory
            .items()
            .create_item(item)
            .unwrap()
            .into_record()
            .unwrap();
        self.broker.clear();
        created
    }

    /// Instance `i-1` with holdings `h-1` shelved at `main` under `QA 76`.
    pub fn seed_hierarchy(&self) -> (Instance, HoldingsRecord) {
        let instance = self.seed_instance("i-1");
        let holdings = self.seed_holdings(HoldingsRecord {
            permanent_location_id: Some("main".into()),
            call_number: Some("QA 76".into()),
            ..HoldingsRecord::new("h-1", "i-1")
        });
        (instance, holdings)
    }

    pub fn stored_item(&self, id: &str) -> Item {
        self.store.records::<Item>().fetch(id).unwrap()
    }

    pub fn stored_holdings(&self, id: &str) -> HoldingsRecord {
        self.store.records::<HoldingsRecord>().fetch(id).unwrap()
    }
}

/// An item that passes every create validation.
pub fn item(id: &str, holdings_id: &str) -> Item {
    Item {
        material_type_id: Some(uuid(100)),
        permanent_loan_type_id: Some(uuid(200)),
        status: Some(ItemStatus::named("Available")),
        ..Item::new(id, holdings_id)
    }
}
