//! Broker boundary and the in-process brokers shipped with the crate.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::PublishError;

/// Message broker client.
pub trait Broker: Send + Sync {
    /// Send one message and wait for the acknowledgment.
    fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// True while the outgoing queue is saturated.
    fn write_queue_full(&self) -> bool {
        false
    }

    /// Block until the outgoing queue has drained.
    fn wait_drained(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// A message accepted by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl SentMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }

    /// The `type` field of a domain event payload.
    pub fn event_type(&self) -> Option<String> {
        self.json()
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
    }
}

#[derive(Default)]
struct MemoryBrokerState {
    sent: Vec<SentMessage>,
    fail_remaining: usize,
    fail_all: bool,
    queue_capacity: Option<usize>,
    queued: usize,
    drains: usize,
}

/// A broker that keeps every message in a shared buffer.
///
/// Failures and a bounded write queue can be simulated.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryBrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a full write queue after `capacity` unacknowledged sends.
    pub fn with_queue_capacity(self, capacity: usize) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.queue_capacity = Some(capacity.max(1));
        }
        self
    }

    /// Reject the next `count` sends.
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_remaining = count;
        }
    }

    pub fn fail_all(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_all = fail;
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state
            .lock()
            .map(|state| state.sent.clone())
            .unwrap_or_default()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.topic == topic).collect()
    }

    /// Times a full queue was waited on.
    pub fn drains(&self) -> usize {
        self.state.lock().map(|state| state.drains).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.sent.clear();
        }
    }
}

impl Broker for MemoryBroker {
    fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("broker buffer poisoned".into()))?;

        if state.fail_all {
            return Err(PublishError::Rejected(format!("topic {} unavailable", topic)));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(PublishError::Timeout);
        }

        trace!(topic, key, bytes = payload.len(), "message accepted");
        state.sent.push(SentMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        state.queued += 1;
        Ok(())
    }

    fn write_queue_full(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.queue_capacity.is_some_and(|cap| state.queued >= cap))
            .unwrap_or(false)
    }

    fn wait_drained(&self) -> Result<(), PublishError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("broker buffer poisoned".into()))?;
        state.queued = 0;
        state.drains += 1;
        Ok(())
    }
}

/// A broker that hands every message to in-process listeners keyed by topic.
#[cfg(feature = "emitter")]
pub struct EmitterBroker {
    emitter: Mutex<event_emitter_rs::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl Default for EmitterBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "emitter")]
impl EmitterBroker {
    pub fn new() -> Self {
        EmitterBroker {
            emitter: Mutex::new(event_emitter_rs::EventEmitter::new()),
        }
    }

    /// Register a listener receiving the JSON payloads sent to `topic`.
    pub fn on<F>(&self, topic: &str, listener: F) -> Result<(), PublishError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("emitter poisoned".into()))?;
        emitter.on(topic, listener);
        Ok(())
    }
}

#[cfg(feature = "emitter")]
impl Broker for EmitterBroker {
    fn send(&self, topic: &str, _key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))?;
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("emitter poisoned".into()))?;
        emitter.emit(topic, payload);
        Ok(())
    }
}
