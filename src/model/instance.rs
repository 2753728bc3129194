use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Metadata, Record};

const CONSORTIUM_SOURCE_PREFIX: &str = "CONSORTIUM-";

/// Bibliographic record at the root of the hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_suppress: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statistical_code_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Instance {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Instance {
            id: id.into(),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Shared (consortium) copies may be re-identified by the central tenant.
    pub fn is_consortium_shadow_copy(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|source| source.starts_with(CONSORTIUM_SOURCE_PREFIX))
    }
}

impl Record for Instance {
    const COLLECTION: &'static str = "instance";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn version(&self) -> Option<i64> {
        self.version
    }

    fn set_version(&mut self, version: Option<i64>) {
        self.version = version;
    }

    fn hrid(&self) -> Option<&str> {
        self.hrid.as_deref()
    }

    fn set_hrid(&mut self, hrid: String) {
        self.hrid = Some(hrid);
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = Some(metadata);
    }
}
