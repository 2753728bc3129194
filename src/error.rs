//! Error types surfaced by the mutation pipelines.
//!
//! Every pipeline operation either succeeds or fails with one
//! [`InventoryError`]. The request layer maps the variants onto its own
//! responses; nothing here knows about status codes. Broker failures are
//! [`PublishError`]s and never reach the caller of a mutation.

use serde::Serialize;
use thiserror::Error;

use crate::store::{ConstraintViolation, ModelError};

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationFailure {
            message: message.into(),
            code: None,
            field: field.into(),
            value: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Kinds of conflicting writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("Cannot update record {id} because it has been changed (optimistic locking): Stored _version is {actual}, _version of request is {expected}")]
    Version {
        collection: String,
        id: String,
        expected: i64,
        actual: i64,
    },
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Hrid(String),
}

/// Error type for the mutation pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Structurally invalid input. Never retried.
    #[error("{}", join_messages(.0))]
    Validation(Vec<ValidationFailure>),

    /// Optimistic lock mismatch or duplicate unique key.
    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("{0}")]
    NotFound(String),

    /// A referenced parent id does not exist.
    #[error("Cannot set {table}.{field} = {value} because it does not exist in {referenced_table}.id.")]
    DependencyMissing {
        table: String,
        field: String,
        value: String,
        referenced_table: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_messages(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl InventoryError {
    /// Single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        InventoryError::Validation(vec![ValidationFailure::new(field, message)])
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, InventoryError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, InventoryError::Conflict(_))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, InventoryError::Conflict(ConflictKind::Version { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::NotFound(_))
    }

    pub fn is_dependency_missing(&self) -> bool {
        matches!(self, InventoryError::DependencyMissing { .. })
    }

    /// Field-level failures, empty for non-validation errors.
    pub fn failures(&self) -> &[ValidationFailure] {
        match self {
            InventoryError::Validation(failures) => failures,
            _ => &[],
        }
    }
}

/// Splits `Key (field)=(value) ...` into its field and value.
fn parse_key_detail(detail: &str) -> Option<(&str, &str)> {
    let rest = detail.strip_prefix("Key (")?;
    let (field, rest) = rest.split_once(")=(")?;
    let end = rest
        .rfind(") already exists")
        .or_else(|| rest.rfind(") is not present"))?;
    Some((field, &rest[..end]))
}

/// Table named in `... is not present in table "table".`
fn parse_referenced_table(detail: &str) -> Option<&str> {
    let (_, rest) = detail.split_once("in table \"")?;
    rest.split('"').next()
}

impl From<ConstraintViolation> for InventoryError {
    fn from(violation: ConstraintViolation) -> Self {
        match violation {
            ConstraintViolation::ForeignKey { table, detail } => {
                match (parse_key_detail(&detail), parse_referenced_table(&detail)) {
                    (Some((field, value)), Some(referenced)) => InventoryError::DependencyMissing {
                        table,
                        field: field.to_lowercase(),
                        value: value.to_string(),
                        referenced_table: referenced.to_string(),
                    },
                    _ => InventoryError::validation("", detail),
                }
            }
            ConstraintViolation::Unique { table, detail } => match parse_key_detail(&detail) {
                Some((field, value)) => {
                    let message = format!(
                        "{} value already exists in table {}: {}",
                        field, table, value
                    );
                    if field.contains("hrid") {
                        InventoryError::Conflict(ConflictKind::Hrid(message))
                    } else {
                        InventoryError::Conflict(ConflictKind::Duplicate(message))
                    }
                }
                None => InventoryError::Conflict(ConflictKind::Duplicate(detail)),
            },
        }
    }
}

impl From<ModelError> for InventoryError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::ConcurrencyConflict {
                collection,
                id,
                expected,
                actual,
            } => InventoryError::Conflict(ConflictKind::Version {
                collection,
                id,
                expected,
                actual,
            }),
            ModelError::Constraint(violation) => violation.into(),
            ModelError::NotFound { collection, id } => {
                InventoryError::NotFound(format!("{} not found: {}", collection, id))
            }
            ModelError::Serde(msg) | ModelError::Storage(msg) => InventoryError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Internal(err.to_string())
    }
}

/// Error type for broker sends.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("timeout waiting for acknowledgment")]
    Timeout,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::SerializationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_key_detail_becomes_dependency_missing() {
        let err: InventoryError = ConstraintViolation::ForeignKey {
            table: "item".into(),
            detail: "Key (holdingsRecordId)=(h-404) is not present in table \"holdings_record\"."
                .into(),
        }
        .into();

        assert!(err.is_dependency_missing());
        assert_eq!(
            err.to_string(),
            "Cannot set item.holdingsrecordid = h-404 because it does not exist in holdings_record.id."
        );
    }

    #[test]
    fn unique_detail_becomes_duplicate() {
        let err: InventoryError = ConstraintViolation::Unique {
            table: "item".into(),
            detail: "Key (barcode)=(326547658598) already exists.".into(),
        }
        .into();

        assert_eq!(
            err,
            InventoryError::Conflict(ConflictKind::Duplicate(
                "barcode value already exists in table item: 326547658598".into()
            ))
        );
    }

    #[test]
    fn duplicate_hrid_is_its_own_conflict() {
        let err: InventoryError = ConstraintViolation::Unique {
            table: "item".into(),
            detail: "Key (hrid)=(it00000000001) already exists.".into(),
        }
        .into();

        assert!(matches!(err, InventoryError::Conflict(ConflictKind::Hrid(_))));
        assert_eq!(
            err.to_string(),
            "hrid value already exists in table item: it00000000001"
        );
    }

    #[test]
    fn unparseable_detail_is_kept_verbatim() {
        let err: InventoryError = ConstraintViolation::Unique {
            table: "item".into(),
            detail: "duplicate key".into(),
        }
        .into();
        assert_eq!(err.to_string(), "duplicate key");
    }

    #[test]
    fn concurrency_conflict_maps_to_version_conflict() {
        let err: InventoryError = ModelError::ConcurrencyConflict {
            collection: "item".into(),
            id: "it-1".into(),
            expected: 1,
            actual: 2,
        }
        .into();

        assert!(err.is_version_conflict());
        assert!(!err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn validation_display_joins_messages() {
        let err = InventoryError::Validation(vec![
            ValidationFailure::new("a", "first"),
            ValidationFailure::new("b", "second").with_code("field.required"),
        ]);
        assert_eq!(err.to_string(), "first; second");
        assert_eq!(err.failures()[1].code.as_deref(), Some("field.required"));
    }
}
