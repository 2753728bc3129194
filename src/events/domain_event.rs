use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Key of the single event announcing that a whole collection was cleared.
pub const NULL_INSTANCE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventType {
    Create,
    Update,
    Delete,
    DeleteAll,
    Reindex,
    Migration,
}

/// Change notification carrying the record before and after the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent<T> {
    pub event_id: String,
    /// Milliseconds since the epoch.
    pub event_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<T>,
    #[serde(rename = "type")]
    pub event_type: DomainEventType,
    pub tenant: String,
}

impl<T> DomainEvent<T> {
    fn build(
        event_type: DomainEventType,
        old: Option<T>,
        new: Option<T>,
        tenant: &str,
    ) -> Self {
        DomainEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_ts: Utc::now().timestamp_millis(),
            old,
            new,
            event_type,
            tenant: tenant.to_string(),
        }
    }

    pub fn created(new: T, tenant: &str) -> Self {
        Self::build(DomainEventType::Create, None, Some(new), tenant)
    }

    pub fn updated(old: T, new: T, tenant: &str) -> Self {
        Self::build(DomainEventType::Update, Some(old), Some(new), tenant)
    }

    pub fn removed(old: T, tenant: &str) -> Self {
        Self::build(DomainEventType::Delete, Some(old), None, tenant)
    }

    pub fn all_removed(tenant: &str) -> Self {
        Self::build(DomainEventType::DeleteAll, None, None, tenant)
    }

    /// Re-announcement of an unchanged record, for backfills.
    pub fn replayed(event_type: DomainEventType, new: T, tenant: &str) -> Self {
        Self::build(event_type, None, Some(new), tenant)
    }
}
