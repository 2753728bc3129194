//! Value types shared by instances, holdings and items.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current time in the ISO-8601 form used for metadata and status dates.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns true when the value is absent or only whitespace.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Audit block maintained by the server. Ignored when comparing records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by_user_id: Option<String>,
}

impl Metadata {
    pub fn created_now() -> Self {
        let now = now_iso();
        Metadata {
            created_date: Some(now.clone()),
            updated_date: Some(now),
            ..Default::default()
        }
    }

    /// Keeps the creation stamp of `previous` and refreshes the update time.
    pub fn updated_from(previous: Option<&Metadata>) -> Self {
        let mut metadata = previous.cloned().unwrap_or_default();
        if metadata.created_date.is_none() {
            metadata.created_date = Some(now_iso());
        }
        metadata.updated_date = Some(now_iso());
        metadata
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ItemStatus {
    pub fn named(name: impl Into<String>) -> Self {
        ItemStatus {
            name: name.into(),
            date: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CirculationNote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_note_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_only: Option<bool>,
}

/// Call number parts as they apply to an item after inheritance from its holdings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveCallNumberComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
}

impl EffectiveCallNumberComponents {
    pub fn is_empty(&self) -> bool {
        self.call_number.is_none()
            && self.prefix.is_none()
            && self.suffix.is_none()
            && self.type_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("")));
        assert!(is_blank(Some("  \t")));
        assert!(!is_blank(Some(" x ")));
    }

    #[test]
    fn updated_metadata_keeps_creation_stamp() {
        let created = Metadata {
            created_date: Some("2020-01-01T00:00:00.000Z".into()),
            created_by_user_id: Some("user-1".into()),
            ..Default::default()
        };

        let updated = Metadata::updated_from(Some(&created));
        assert_eq!(updated.created_date, created.created_date);
        assert_eq!(updated.created_by_user_id.as_deref(), Some("user-1"));
        assert!(updated.updated_date.is_some());
    }

    #[test]
    fn empty_components_serialize_to_empty_object() {
        let json = serde_json::to_string(&EffectiveCallNumberComponents::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
