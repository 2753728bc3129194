//! Publish failures - durable record of every message the broker refused.
//!
//! A failed send never fails the mutation that caused it. The message is
//! stored instead, so it can be inspected and replayed later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::broker::Broker;
use crate::error::Result;
use crate::model::Record;
use crate::store::{RecordStore, RecordsExt, UnitOfWork};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum FailureStatus {
    Pending,
    Replayed,
    Failed,
}

/// A message that could not be delivered.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailure {
    pub id: String,
    pub topic: String,
    pub key: String,
    pub payload: String,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
    pub status: FailureStatus,
    pub attempts: u32,
    pub replayed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PublishFailure {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        PublishFailure {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            key: key.into(),
            payload: payload.into(),
            error: error.into(),
            occurred_at: Utc::now(),
            status: FailureStatus::Pending,
            attempts: 0,
            replayed_at: None,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == FailureStatus::Pending
    }
}

impl Record for PublishFailure {
    const COLLECTION: &'static str = "publish_failure";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Receives every message the broker refused.
pub trait FailureHandler: Send + Sync {
    fn handle_failure(&self, failure: PublishFailure);
}

/// Result of a replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayResult {
    pub attempted: usize,
    pub replayed: usize,
    pub retrying: usize,
    pub failed: usize,
}

/// Store-backed failure log.
#[derive(Clone)]
pub struct FailureLog<S> {
    store: S,
    max_attempts: u32,
}

impl<S: RecordStore> FailureLog<S> {
    pub fn new(store: S) -> Self {
        FailureLog {
            store,
            max_attempts: 3,
        }
    }

    /// Replays allowed before a failure is given up on.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Every recorded failure, oldest first.
    pub fn list(&self) -> Result<Vec<PublishFailure>> {
        let mut failures = self.store.records::<PublishFailure>().find(&|_| true)?;
        failures.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        Ok(failures)
    }

    pub fn pending(&self) -> Result<Vec<PublishFailure>> {
        Ok(self.list()?.into_iter().filter(|f| f.is_pending()).collect())
    }

    /// Resend every pending failure, oldest first.
    pub fn replay(&self, broker: &dyn Broker) -> Result<ReplayResult> {
        let mut result = ReplayResult::default();
        let mut unit = UnitOfWork::new();

        for mut failure in self.pending()? {
            result.attempted += 1;
            failure.attempts += 1;
            match broker.send(&failure.topic, &failure.key, failure.payload.as_bytes()) {
                Ok(()) => {
                    failure.status = FailureStatus::Replayed;
                    failure.replayed_at = Some(Utc::now());
                    result.replayed += 1;
                }
                Err(err) => {
                    failure.last_error = Some(err.to_string());
                    if failure.attempts >= self.max_attempts {
                        failure.status = FailureStatus::Failed;
                        result.failed += 1;
                        warn!(id = %failure.id, topic = %failure.topic, "giving up on publish failure");
                    } else {
                        result.retrying += 1;
                    }
                }
            }
            unit.upsert(&failure)?;
        }

        if !unit.is_empty() {
            self.store.run_atomic(unit)?;
        }
        info!(
            attempted = result.attempted,
            replayed = result.replayed,
            failed = result.failed,
            "publish failures replayed"
        );
        Ok(result)
    }
}

impl<S: RecordStore> FailureHandler for FailureLog<S> {
    fn handle_failure(&self, failure: PublishFailure) {
        error!(
            topic = %failure.topic,
            key = %failure.key,
            error = %failure.error,
            "failed to publish domain event"
        );

        let mut unit = UnitOfWork::new();
        let staged = unit.insert(&failure).map(|_| ());
        let stored = staged.and_then(|()| self.store.run_atomic(unit).map(|_| ()));
        if let Err(err) = stored {
            error!(
                topic = %failure.topic,
                key = %failure.key,
                payload = %failure.payload,
                error = %err,
                "failed to record publish failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryBroker;
    use crate::store::InMemoryRecordStore;

    #[test]
    fn failures_are_persisted() {
        let store = InMemoryRecordStore::new();
        let log = FailureLog::new(store.clone());

        log.handle_failure(PublishFailure::new("t.item", "i-1", "{}", "timeout"));
        log.handle_failure(PublishFailure::new("t.item", "i-2", "{}", "timeout"));

        let failures = log.list().unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].occurred_at <= failures[1].occurred_at);
        assert!(failures.iter().any(|f| f.key == "i-2"));
        assert!(failures.iter().all(|f| f.is_pending()));
    }

    #[test]
    fn replay_resends_and_marks() {
        let store = InMemoryRecordStore::new();
        let log = FailureLog::new(store);
        log.handle_failure(PublishFailure::new("t.item", "i-1", r#"{"a":1}"#, "timeout"));

        let broker = MemoryBroker::new();
        let result = log.replay(&broker).unwrap();
        assert_eq!(result.replayed, 1);
        assert_eq!(broker.sent()[0].key, "i-1");
        assert!(log.pending().unwrap().is_empty());
        assert_eq!(log.list().unwrap()[0].status, FailureStatus::Replayed);
    }

    #[test]
    fn replay_gives_up_after_max_attempts() {
        let log = FailureLog::new(InMemoryRecordStore::new()).with_max_attempts(2);
        log.handle_failure(PublishFailure::new("t.item", "i-1", "{}", "timeout"));

        let broker = MemoryBroker::new();
        broker.fail_all(true);

        let first = log.replay(&broker).unwrap();
        assert_eq!(first.retrying, 1);
        let second = log.replay(&broker).unwrap();
        assert_eq!(second.failed, 1);

        let stored = &log.list().unwrap()[0];
        assert_eq!(stored.status, FailureStatus::Failed);
        assert_eq!(stored.attempts, 2);
        assert!(stored.last_error.is_some());
        assert_eq!(log.replay(&broker).unwrap(), ReplayResult::default());
    }
}
