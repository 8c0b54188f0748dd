//! Metadata Gateway (C3)
//!
//! Dataset/variable catalogue: read variables, flip inferred types, list and
//! search datasets. Polymorphic over its backing (primary catalogue,
//! federated external catalogue, or on-disk staging folder); every returned
//! `Dataset` carries a `provenance` tag so callers can tell which.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::{Dataset, SemanticType, Variable};

#[async_trait]
pub trait MetadataGateway: Send + Sync {
    async fn get_dataset(&self, dataset_id: &str) -> OrchestrationResult<Dataset>;

    async fn list_variables(&self, dataset_id: &str) -> OrchestrationResult<Vec<Variable>>;

    /// Updates both the catalogue and the data store's column-inference
    /// hint. Fails with `InvalidRequest` (mapped from `TypeChangeLocked`) if
    /// the variable participates in an active Request.
    async fn set_type(
        &self,
        dataset_id: &str,
        variable_key: &str,
        new_type: SemanticType,
    ) -> OrchestrationResult<()>;

    async fn list_datasets(&self) -> OrchestrationResult<Vec<Dataset>>;

    async fn search_datasets(&self, query: &str) -> OrchestrationResult<Vec<Dataset>>;

    /// Locks `variable_keys` against `set_type` for the lifetime of an
    /// active Request that reads them (spec §4.3). Called by the engine on
    /// dispatch; paired with [`MetadataGateway::unlock_variables`] on the
    /// request's terminal transition.
    async fn lock_variables(&self, dataset_id: &str, variable_keys: &[String]);

    async fn unlock_variables(&self, dataset_id: &str, variable_keys: &[String]);
}

/// Error raised by `set_type` when the variable is locked by an active Request.
#[derive(Debug, thiserror::Error)]
#[error("variable '{variable_key}' on dataset '{dataset_id}' is locked by an active request")]
pub struct TypeChangeLocked {
    pub dataset_id: String,
    pub variable_key: String,
}

/// Tracks which `(dataset_id, variable_key)` pairs are referenced by an
/// active Request, so `set_type` can enforce the type-change lock. Held by
/// the engine and threaded into the catalogue gateway.
#[derive(Default)]
pub struct TypeLockRegistry {
    locked: RwLock<HashSet<(String, String)>>,
}

impl TypeLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, dataset_id: &str, variable_key: &str) {
        self.locked
            .write()
            .insert((dataset_id.to_string(), variable_key.to_string()));
    }

    pub fn unlock(&self, dataset_id: &str, variable_key: &str) {
        self.locked
            .write()
            .remove(&(dataset_id.to_string(), variable_key.to_string()));
    }

    pub fn is_locked(&self, dataset_id: &str, variable_key: &str) -> bool {
        self.locked
            .read()
            .contains(&(dataset_id.to_string(), variable_key.to_string()))
    }
}

/// In-process catalogue implementation. Backs the common case (a primary
/// metadata store reachable over HTTP) with an in-memory index refreshed by
/// the caller; federated/staging backends implement the same trait.
pub struct InMemoryCatalogue {
    datasets: RwLock<Vec<Dataset>>,
    locks: TypeLockRegistry,
}

impl InMemoryCatalogue {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self { datasets: RwLock::new(datasets), locks: TypeLockRegistry::new() }
    }

    pub fn locks(&self) -> &TypeLockRegistry {
        &self.locks
    }
}

#[async_trait]
impl MetadataGateway for InMemoryCatalogue {
    async fn get_dataset(&self, dataset_id: &str) -> OrchestrationResult<Dataset> {
        self.datasets
            .read()
            .iter()
            .find(|d| d.id == dataset_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::InvalidRequest(format!("unknown dataset: {dataset_id}")))
    }

    async fn list_variables(&self, dataset_id: &str) -> OrchestrationResult<Vec<Variable>> {
        Ok(self.get_dataset(dataset_id).await?.variables)
    }

    async fn set_type(
        &self,
        dataset_id: &str,
        variable_key: &str,
        new_type: SemanticType,
    ) -> OrchestrationResult<()> {
        if self.locks.is_locked(dataset_id, variable_key) {
            return Err(OrchestrationError::InvalidRequest(
                TypeChangeLocked {
                    dataset_id: dataset_id.to_string(),
                    variable_key: variable_key.to_string(),
                }
                .to_string(),
            ));
        }
        let mut datasets = self.datasets.write();
        let dataset = datasets
            .iter_mut()
            .find(|d| d.id == dataset_id)
            .ok_or_else(|| OrchestrationError::InvalidRequest(format!("unknown dataset: {dataset_id}")))?;
        let variable = dataset
            .variables
            .iter_mut()
            .find(|v| v.key == variable_key)
            .ok_or_else(|| OrchestrationError::InvalidRequest(format!("unknown variable: {variable_key}")))?;
        variable.semantic_type = new_type;
        Ok(())
    }

    async fn list_datasets(&self) -> OrchestrationResult<Vec<Dataset>> {
        Ok(self.datasets.read().clone())
    }

    async fn search_datasets(&self, query: &str) -> OrchestrationResult<Vec<Dataset>> {
        let needle = query.to_lowercase();
        Ok(self
            .datasets
            .read()
            .iter()
            .filter(|d| d.id.to_lowercase().contains(&needle) || d.storage_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn lock_variables(&self, dataset_id: &str, variable_keys: &[String]) {
        for key in variable_keys {
            self.locks.lock(dataset_id, key);
        }
    }

    async fn unlock_variables(&self, dataset_id: &str, variable_keys: &[String]) {
        for key in variable_keys {
            self.locks.unlock(dataset_id, key);
        }
    }
}
