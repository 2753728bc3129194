use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::broker::Broker;
use super::domain_event::{DomainEvent, DomainEventType, NULL_INSTANCE_ID};
use super::failure::{FailureHandler, PublishFailure};
use super::ordering::EventSource;
use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::RecordStore;

/// Records pulled from a stream per instance id lookup.
pub const STREAM_CHUNK_SIZE: usize = 100;

/// Messages accepted and refused by one publish call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
}

impl PublishSummary {
    fn record(&mut self, sent: bool) {
        if sent {
            self.published += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// A streamed publish stopped early.
#[derive(Debug, Error)]
#[error("stream publishing aborted after {published} records: {source}")]
pub struct StreamAborted {
    pub published: usize,
    #[source]
    pub source: InventoryError,
}

/// Turns committed record changes into domain events on one topic.
///
/// Sending never fails the caller: refused messages go to the failure handler.
pub struct DomainEventPublisher<T, S> {
    store: S,
    broker: Arc<dyn Broker>,
    failures: Arc<dyn FailureHandler>,
    topic: String,
    tenant: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: EventSource, S: RecordStore> DomainEventPublisher<T, S> {
    pub fn new(
        store: S,
        broker: Arc<dyn Broker>,
        failures: Arc<dyn FailureHandler>,
        config: &InventoryConfig,
    ) -> Self {
        DomainEventPublisher {
            store,
            broker,
            failures,
            topic: config.topic(T::ENTITY),
            tenant: config.tenant.clone(),
            _marker: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn instance_ids(&self, records: &[&T]) -> Vec<Option<String>> {
        match T::instance_ids(&self.store, records) {
            Ok(ids) => ids,
            Err(err) => {
                warn!(topic = %self.topic, error = %err, "could not resolve instance ids for events");
                vec![None; records.len()]
            }
        }
    }

    fn send<P: Serialize>(&self, key: Option<&str>, event: &DomainEvent<P>) -> bool {
        let key = key.unwrap_or_default();
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(err) => {
                self.failures.handle_failure(PublishFailure::new(
                    &self.topic,
                    key,
                    String::new(),
                    format!("serialization failed: {}", err),
                ));
                return false;
            }
        };

        match self.broker.send(&self.topic, key, &payload) {
            Ok(()) => {
                debug!(topic = %self.topic, key = %key, event_type = ?event.event_type, "domain event sent");
                true
            }
            Err(err) => {
                self.failures.handle_failure(PublishFailure::new(
                    &self.topic,
                    key,
                    String::from_utf8_lossy(&payload),
                    err.to_string(),
                ));
                false
            }
        }
    }

    pub fn publish_created(&self, record: &T) -> PublishSummary {
        self.publish_batch(std::slice::from_ref(record), &[])
    }

    pub fn publish_updated(&self, old: &T, new: &T) -> PublishSummary {
        let ids = self.instance_ids(&[old, new]);
        let mut summary = PublishSummary::default();
        summary.record(self.send_update(old, ids[0].as_deref(), new, ids[1].as_deref()));
        summary
    }

    /// Update events for pairs whose owning instances are already known.
    ///
    /// Used when the parent moved in the same commit, where a lookup would
    /// only find the new owner for both snapshots.
    pub fn publish_updated_between(
        &self,
        updated: &[(T, T)],
        old_instance_id: Option<&str>,
        new_instance_id: Option<&str>,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for (old, new) in updated {
            summary.record(self.send_update(old, old_instance_id, new, new_instance_id));
        }
        summary
    }

    fn send_update(&self, old: &T, old_id: Option<&str>, new: &T, new_id: Option<&str>) -> bool {
        let event = DomainEvent::updated(old.payload(old_id), new.payload(new_id), &self.tenant);
        self.send(new_id.or(old_id), &event)
    }

    pub fn publish_removed(&self, record: &T) -> PublishSummary {
        self.publish_removed_all_of(std::slice::from_ref(record))
    }

    /// One removal event per record, in order.
    pub fn publish_removed_all_of(&self, records: &[T]) -> PublishSummary {
        let refs: Vec<&T> = records.iter().collect();
        let ids = self.instance_ids(&refs);
        let mut summary = PublishSummary::default();
        for (record, id) in records.iter().zip(ids) {
            let event = DomainEvent::removed(record.payload(id.as_deref()), &self.tenant);
            summary.record(self.send(id.as_deref(), &event));
        }
        summary
    }

    /// A single event standing for the removal of every record on the topic.
    pub fn publish_all_removed(&self) -> PublishSummary {
        let event: DomainEvent<T::Payload> = DomainEvent::all_removed(&self.tenant);
        let mut summary = PublishSummary::default();
        summary.record(self.send(Some(NULL_INSTANCE_ID), &event));
        info!(topic = %self.topic, "all records removed event sent");
        summary
    }

    /// Created events in input order, then update events for the `(old, new)` pairs.
    pub fn publish_batch(&self, created: &[T], updated: &[(T, T)]) -> PublishSummary {
        let mut refs: Vec<&T> = created.iter().collect();
        for (old, new) in updated {
            refs.push(old);
            refs.push(new);
        }
        let ids = self.instance_ids(&refs);
        let (created_ids, updated_ids) = ids.split_at(created.len());

        let mut summary = PublishSummary::default();
        for (record, id) in created.iter().zip(created_ids) {
            let event = DomainEvent::created(record.payload(id.as_deref()), &self.tenant);
            summary.record(self.send(id.as_deref(), &event));
        }
        for ((old, new), pair) in updated.iter().zip(updated_ids.chunks(2)) {
            let (old_id, new_id) = (pair[0].as_deref(), pair[1].as_deref());
            summary.record(self.send_update(old, old_id, new, new_id));
        }
        summary
    }

    /// Re-announce records unchanged, e.g. to rebuild a search index.
    pub fn publish_reindex(&self, records: &[T]) -> PublishSummary {
        let refs: Vec<&T> = records.iter().collect();
        let ids = self.instance_ids(&refs);
        let mut summary = PublishSummary::default();
        for (record, id) in records.iter().zip(ids) {
            let event = DomainEvent::replayed(
                DomainEventType::Reindex,
                record.payload(id.as_deref()),
                &self.tenant,
            );
            summary.record(self.send(id.as_deref(), &event));
        }
        summary
    }

    /// Publish a long stream with back-pressure.
    ///
    /// Records are pulled in chunks of [`STREAM_CHUNK_SIZE`] and their
    /// instance ids resolved once per chunk. While the broker reports a full
    /// write queue, nothing more is sent until it has drained. Refused sends
    /// go to the failure handler and are not counted. `on_progress` receives
    /// the running count after every record. A stream error, a progress error
    /// or a failed drain stops the stream; records pulled before a stream
    /// error are still published.
    pub fn publish_stream<I, F>(
        &self,
        records: I,
        event_type: DomainEventType,
        mut on_progress: F,
    ) -> Result<usize, StreamAborted>
    where
        I: IntoIterator<Item = Result<T, InventoryError>>,
        F: FnMut(usize) -> Result<(), InventoryError>,
    {
        let mut records = records.into_iter();
        let mut published = 0usize;

        loop {
            let mut chunk = Vec::with_capacity(STREAM_CHUNK_SIZE);
            let mut stream_error = None;
            while chunk.len() < STREAM_CHUNK_SIZE {
                match records.next() {
                    Some(Ok(record)) => chunk.push(record),
                    Some(Err(err)) => {
                        stream_error = Some(err);
                        break;
                    }
                    None => break,
                }
            }
            let exhausted = chunk.len() < STREAM_CHUNK_SIZE;
            if chunk.is_empty() && stream_error.is_none() {
                break;
            }

            let refs: Vec<&T> = chunk.iter().collect();
            let ids = self.instance_ids(&refs);
            for (record, id) in chunk.iter().zip(ids) {
                let event = DomainEvent::replayed(event_type, record.payload(id.as_deref()), &self.tenant);
                if self.send(id.as_deref(), &event) {
                    published += 1;
                }

                on_progress(published).map_err(|source| StreamAborted { published, source })?;

                if self.broker.write_queue_full() {
                    debug!(topic = %self.topic, published, "write queue full, pausing stream");
                    self.broker.wait_drained().map_err(|err| StreamAborted {
                        published,
                        source: InventoryError::Internal(err.to_string()),
                    })?;
                }
            }

            if let Some(source) = stream_error {
                return Err(StreamAborted { published, source });
            }
            if exhausted {
                break;
            }
        }

        info!(topic = %self.topic, published, "stream published");
        Ok(published)
    }
}
