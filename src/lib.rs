//! Storage-side consistency and event pipeline for an inventory hierarchy of
//! instances, holdings records and items.
//!
//! Mutations go through [`Inventory`], which validates input, assigns HRIDs,
//! derives item effective values, persists through a [`RecordStore`] in one
//! atomic unit and then announces every committed change on a [`Broker`].

pub mod config;
pub mod cql;
pub mod effective;
mod error;
pub mod events;
pub mod hrid;
pub mod migration;
mod model;
pub mod patch;
pub mod pipeline;
mod store;

pub use config::InventoryConfig;
pub use cql::CqlQuery;
pub use error::{ConflictKind, InventoryError, PublishError, Result, ValidationFailure};
#[cfg(feature = "emitter")]
pub use events::EmitterBroker;
pub use events::{
    Broker, DomainEvent, DomainEventPublisher, DomainEventType, EventSource, FailureHandler,
    FailureLog, FailureStatus, ItemWithInstanceId, MemoryBroker, PublishFailure, PublishSummary,
    ReplayResult, SentMessage, StreamAborted, NULL_INSTANCE_ID,
};
pub use hrid::{HridKind, HridManager, HridSetting, HridSettings, HRID_SETTINGS_ID};
pub use migration::{ShelvingOrderMigration, VERSION_WITH_SHELVING_ORDER};
pub use model::{
    ensure_id, is_blank, is_uuid, now_iso, CirculationNote, EffectiveCallNumberComponents,
    ForeignKey, HoldingsRecord, Instance, Item, ItemStatus, Metadata, Note, Record,
};
pub use patch::{PatchData, PatchRequest};
pub use pipeline::{
    BatchOperationContext, HoldingsService, InstanceService, Inventory, InventoryRecord,
    ItemService, Outcome,
};
pub use store::{
    CommitReceipt, ConstraintViolation, InMemoryRecordStore, ModelError, RecordRepository,
    RecordStore, RecordsExt, StagedRecord, StoreStats, UnitOfWork, WriteOp,
};

// In-process delivery for the emitter broker.
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
