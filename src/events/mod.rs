//! Domain events - one message per committed change, keyed by the owning
//! instance, with refused messages kept in a durable failure log.

mod broker;
mod domain_event;
mod failure;
mod ordering;
mod publisher;

#[cfg(feature = "emitter")]
pub use broker::EmitterBroker;
pub use broker::{Broker, MemoryBroker, SentMessage};
pub use domain_event::{DomainEvent, DomainEventType, NULL_INSTANCE_ID};
pub use failure::{FailureHandler, FailureLog, FailureStatus, PublishFailure, ReplayResult};
pub use ordering::{EventSource, ItemWithInstanceId};
pub use publisher::{DomainEventPublisher, PublishSummary, StreamAborted, STREAM_CHUNK_SIZE};
