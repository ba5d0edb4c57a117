//! Definition registry: deploy, publish, disable, remove
//!
//! Versions of a process key are append-only. Deploying bumps the version
//! and moves the `is_latest` flag; removal is a logical delete so historic
//! instances keep a resolvable definition id.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use signoff_core::{
    DefinitionStatus, EngineConfig, EngineError, InstanceStatus, ProcessDefinition, Result,
};
use signoff_store::{InstanceFilter, Pagination, ProcessStore};

/// Input for deploying a definition version
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub process_key: String,
    pub process_name: String,
    pub category: Option<String>,
    pub description: Option<String>,

    /// Opaque node-graph document; the engine stores it without interpreting it
    pub process_definition: serde_json::Value,
}

/// Manages process definition versions
pub struct DefinitionRegistry<S: ProcessStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: ProcessStore> Clone for DefinitionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: ProcessStore> DefinitionRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
        }
    }

    /// Use a custom business-type catalog instead of the built-in one
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Deploy a new version of a process definition
    ///
    /// The new version is published immediately and becomes the latest for
    /// its key; earlier versions lose the `is_latest` flag but stay
    /// startable until disabled.
    #[instrument(skip(self, request), fields(process_key = %request.process_key))]
    pub async fn deploy(&self, request: DeployRequest) -> Result<ProcessDefinition> {
        if request.process_key.trim().is_empty() {
            return Err(EngineError::validation("process_key must not be empty"));
        }
        if request.process_name.trim().is_empty() {
            return Err(EngineError::validation("process_name must not be empty"));
        }
        if request.process_definition.is_null() {
            return Err(EngineError::validation(
                "process_definition document must not be null",
            ));
        }
        if let Some(category) = request.category.as_deref() {
            if self.config.business_type(category).is_none() {
                return Err(EngineError::validation(format!(
                    "unknown business type: {category}"
                )));
            }
        }

        let version = match self.store.latest_definition(&request.process_key).await? {
            Some(latest) => latest.version + 1,
            None => 1,
        };

        self.store.mark_not_latest(&request.process_key).await?;

        let definition = ProcessDefinition {
            id: Uuid::now_v7(),
            process_key: request.process_key,
            version,
            process_name: request.process_name,
            category: request.category,
            description: request.description,
            status: DefinitionStatus::Published,
            process_definition: request.process_definition,
            instance_count: 0,
            is_latest: true,
            deleted: false,
            deploy_time: Utc::now(),
        };
        self.store.insert_definition(definition.clone()).await?;

        info!(
            definition_id = %definition.id,
            process_key = %definition.process_key,
            version,
            "definition deployed"
        );
        Ok(definition)
    }

    /// Re-publish a draft or disabled definition
    #[instrument(skip(self))]
    pub async fn publish(&self, definition_id: Uuid) -> Result<ProcessDefinition> {
        let definition = self.store.get_definition(definition_id).await?;
        if definition.deleted {
            return Err(EngineError::invalid_state(format!(
                "definition {definition_id} is deleted"
            )));
        }
        if definition.status == DefinitionStatus::Published {
            return Err(EngineError::invalid_state(format!(
                "definition {definition_id} is already published"
            )));
        }

        let definition = self
            .store
            .update_definition_status(definition_id, DefinitionStatus::Published)
            .await?;
        info!(%definition_id, "definition published");
        Ok(definition)
    }

    /// Disable a published definition; running instances are unaffected
    #[instrument(skip(self))]
    pub async fn disable(&self, definition_id: Uuid) -> Result<ProcessDefinition> {
        let definition = self.store.get_definition(definition_id).await?;
        if definition.status != DefinitionStatus::Published {
            return Err(EngineError::invalid_state(format!(
                "definition {} cannot be disabled: status is {}",
                definition_id, definition.status
            )));
        }

        let definition = self
            .store
            .update_definition_status(definition_id, DefinitionStatus::Disabled)
            .await?;
        info!(%definition_id, "definition disabled");
        Ok(definition)
    }

    /// Logically delete a definition
    ///
    /// Refused while live instances of it exist. Historic (terminal)
    /// instances keep referencing the row, which is why this is a flag and
    /// not a row delete.
    #[instrument(skip(self))]
    pub async fn remove(&self, definition_id: Uuid) -> Result<()> {
        // Existence check first for a precise NotFound
        self.store.get_definition(definition_id).await?;

        let live = self
            .store
            .list_instances(
                InstanceFilter {
                    definition_id: Some(definition_id),
                    status_in: Some(vec![InstanceStatus::Running, InstanceStatus::Suspended]),
                    ..Default::default()
                },
                Pagination {
                    offset: 0,
                    limit: 1,
                },
            )
            .await?;
        if !live.is_empty() {
            return Err(EngineError::invalid_state(format!(
                "definition {definition_id} still has live instances"
            )));
        }

        self.store.mark_definition_deleted(definition_id).await?;
        info!(%definition_id, "definition removed");
        Ok(())
    }

    /// Get a definition by id
    pub async fn get(&self, definition_id: Uuid) -> Result<ProcessDefinition> {
        Ok(self.store.get_definition(definition_id).await?)
    }

    /// Latest non-deleted version for a process key
    pub async fn latest(&self, process_key: &str) -> Result<Option<ProcessDefinition>> {
        Ok(self.store.latest_definition(process_key).await?)
    }

    /// List definitions, optionally by category, newest deploy first
    pub async fn list(
        &self,
        category: Option<&str>,
        pagination: Pagination,
    ) -> Result<Vec<ProcessDefinition>> {
        Ok(self.store.list_definitions(category, pagination).await?)
    }
}
