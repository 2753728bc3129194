use std::sync::Arc;

use super::{check_hrid_unchanged, validate_statistical_codes, Outcome, Pipeline};
use crate::config::InventoryConfig;
use crate::error::Result;
use crate::events::{Broker, FailureHandler, StreamAborted};
use crate::model::Instance;
use crate::store::RecordStore;

/// Create, replace and delete instances.
pub struct InstanceService<S> {
    pipeline: Pipeline<Instance, S>,
}

impl<S: RecordStore + Clone> InstanceService<S> {
    pub fn new(
        store: S,
        broker: Arc<dyn Broker>,
        failures: Arc<dyn FailureHandler>,
        config: &InventoryConfig,
    ) -> Self {
        InstanceService {
            pipeline: Pipeline::new(store, broker, failures, config),
        }
    }

    pub fn get_instance(&self, id: &str) -> Result<Instance> {
        self.pipeline.fetch(id)
    }

    pub fn create_instance(&self, instance: Instance) -> Result<Outcome<Instance>> {
        let created = self.pipeline.create_one(instance, |_| Ok(()))?;
        Ok(Outcome::Record(created))
    }

    pub fn create_instances(
        &self,
        instances: Vec<Instance>,
        upsert: Option<bool>,
    ) -> Result<Outcome<Vec<Instance>>> {
        let upsert = upsert.unwrap_or(self.pipeline.config.upsert_by_default);
        let created = self.pipeline.create_many(instances, upsert, |_| Ok(()))?;
        Ok(Outcome::Record(created))
    }

    /// Full replace. Consortium shadow copies may take a new HRID.
    pub fn update_instance(&self, id: &str, mut instance: Instance) -> Result<Outcome<Instance>> {
        instance.id = id.to_string();
        validate_statistical_codes(&instance.statistical_code_ids)?;

        let old = self.pipeline.fetch(id)?;
        check_hrid_unchanged(&old, &instance)?;
        self.pipeline.replace(&old, instance)
    }

    pub fn delete_instance(&self, id: &str) -> Result<Outcome<Instance>> {
        self.pipeline.delete_one(id)?;
        Ok(Outcome::NoContent)
    }

    /// Deleting every instance also clears the collections that hang off them.
    pub fn delete_instances(&self, cql: &str) -> Result<Outcome<Instance>> {
        let dependents = &self.pipeline.config.instance_dependent_collections;
        self.pipeline.delete_by_cql(cql, dependents)?;
        Ok(Outcome::NoContent)
    }

    pub fn reindex<F>(&self, on_progress: F) -> std::result::Result<usize, StreamAborted>
    where
        F: FnMut(usize) -> Result<()>,
    {
        self.pipeline.reindex(on_progress)
    }
}
