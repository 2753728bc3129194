//! Runtime settings shared by the pipelines and the event publisher.

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Settings for one tenant's inventory pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InventoryConfig {
    /// Deployment name used as the first topic segment.
    pub environment: String,
    pub tenant: String,
    /// Largest accepted batch for create and patch operations.
    pub max_batch_size: usize,
    /// Page size of the shelving-order backfill.
    pub migration_fetch_size: usize,
    /// Whether batch creates overwrite existing ids unless told otherwise.
    pub upsert_by_default: bool,
    /// Collections cleared together with all instances.
    pub instance_dependent_collections: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            environment: "folio".into(),
            tenant: "diku".into(),
            max_batch_size: 10_000,
            migration_fetch_size: 5_000,
            upsert_by_default: false,
            instance_dependent_collections: vec![
                "instance_relationship".into(),
                "preceding_succeeding_title".into(),
                "bound_with_part".into(),
            ],
        }
    }
}

impl InventoryConfig {
    pub fn new(tenant: impl Into<String>) -> Self {
        InventoryConfig {
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    /// Parse settings from JSON; missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| InventoryError::validation("config", format!("invalid config: {}", e)))
    }

    /// Read `ENV` and `TENANT` from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(environment) = std::env::var("ENV") {
            config.environment = environment;
        }
        if let Ok(tenant) = std::env::var("TENANT") {
            config.tenant = tenant;
        }
        config
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_migration_fetch_size(mut self, size: usize) -> Self {
        self.migration_fetch_size = size.max(1);
        self
    }

    pub fn with_upsert_by_default(mut self, upsert: bool) -> Self {
        self.upsert_by_default = upsert;
        self
    }

    /// `{env}.{tenant}.inventory.{entity}`
    pub fn topic(&self, entity: &str) -> String {
        format!("{}.{}.inventory.{}", self.environment, self.tenant, entity)
    }

    pub(crate) fn check_batch_size(&self, size: usize) -> Result<()> {
        if size > self.max_batch_size {
            return Err(InventoryError::validation(
                "records",
                format!(
                    "Batch of {} records exceeds the limit of {}",
                    size, self.max_batch_size
                ),
            ));
        }
        Ok(())
    }
}
