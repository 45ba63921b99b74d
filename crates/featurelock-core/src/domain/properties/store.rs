//! Property store service
//!
//! `set_properties` merges into the stored set: it reads the existing names,
//! inserts the new ones and updates the ones already present. Names not
//! mentioned in the call are left alone.

use super::repository::FeaturePropertyRepository;
use super::repository_trait::FeaturePropertyRepositoryTrait;
use crate::config::FeatureLockingConfig;
use crate::domain::key::FeatureKey;
use crate::error::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Split of an incoming property map against what is already stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyDiff {
    /// Names not yet stored
    pub to_add: HashMap<String, String>,
    /// Names already stored
    pub to_update: HashMap<String, String>,
}

impl PropertyDiff {
    /// Partition `incoming` by whether each name exists in `existing`
    pub fn compute(
        incoming: &HashMap<String, String>,
        existing: &HashMap<String, String>,
    ) -> Self {
        let mut diff = Self::default();
        for (name, value) in incoming {
            let target = if existing.contains_key(name) {
                &mut diff.to_update
            } else {
                &mut diff.to_add
            };
            target.insert(name.clone(), value.clone());
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty()
    }
}

/// Property store for feature lock metadata
#[derive(Clone)]
pub struct FeaturePropertyStore {
    repository: Arc<dyn FeaturePropertyRepositoryTrait>,
    config: FeatureLockingConfig,
}

impl FeaturePropertyStore {
    /// Create a store backed by SQLite
    pub fn new(pool: SqlitePool, config: FeatureLockingConfig) -> Self {
        Self::with_repository(Arc::new(FeaturePropertyRepository::new(pool)), config)
    }

    /// Create a store over an arbitrary record store
    pub fn with_repository(
        repository: Arc<dyn FeaturePropertyRepositoryTrait>,
        config: FeatureLockingConfig,
    ) -> Self {
        Self { repository, config }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.per_user_enabled {
            Ok(())
        } else {
            Err(Error::FeatureLockingDisabled)
        }
    }

    pub async fn get_all_properties(&self, key: &FeatureKey) -> Result<HashMap<String, String>> {
        self.ensure_enabled()?;
        self.repository.get_all(key).await
    }

    pub async fn get_property(&self, key: &FeatureKey, name: &str) -> Result<Option<String>> {
        self.ensure_enabled()?;
        self.repository.get(key, name).await
    }

    /// Merge `properties` into the stored set
    ///
    /// New names are inserted first, then existing names are updated. A
    /// failure part way leaves earlier keys applied; re-fetch to reconcile.
    pub async fn set_properties(
        &self,
        key: &FeatureKey,
        properties: &HashMap<String, String>,
    ) -> Result<PropertyDiff> {
        self.ensure_enabled()?;

        if properties.is_empty() {
            return Ok(PropertyDiff::default());
        }

        let existing = self.repository.get_all(key).await?;
        let diff = PropertyDiff::compute(properties, &existing);

        if !diff.to_add.is_empty() {
            self.repository.add(key, &diff.to_add).await?;
        }
        if !diff.to_update.is_empty() {
            self.repository.update(key, &diff.to_update).await?;
        }

        debug!(
            key = %key,
            added = diff.to_add.len(),
            updated = diff.to_update.len(),
            "Feature lock properties set"
        );

        Ok(diff)
    }

    /// Insert properties that must not exist yet
    pub async fn add_properties(
        &self,
        key: &FeatureKey,
        properties: &HashMap<String, String>,
    ) -> Result<()> {
        self.ensure_enabled()?;
        self.repository.add(key, properties).await
    }

    /// Replace values of properties that already exist
    pub async fn update_properties(
        &self,
        key: &FeatureKey,
        properties: &HashMap<String, String>,
    ) -> Result<()> {
        self.ensure_enabled()?;
        self.repository.update(key, properties).await
    }

    /// Delete the named properties; unknown names are ignored
    pub async fn delete_properties(&self, key: &FeatureKey, names: &HashSet<String>) -> Result<()> {
        self.ensure_enabled()?;
        self.repository.delete(key, names).await
    }

    pub async fn delete_all_properties(&self, key: &FeatureKey) -> Result<()> {
        self.ensure_enabled()?;
        self.repository.delete_all(key).await?;
        info!(key = %key, "Feature lock properties cleared");
        Ok(())
    }
}

impl std::fmt::Debug for FeaturePropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePropertyStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
