//! User feature manager
//!
//! Single entry point bundling the lock manager and the property store over
//! one connection pool and one configuration.

use super::key::FeatureKey;
use super::locking::{FeatureLock, FeatureLockManager, LockOutcome};
use super::properties::{FeaturePropertyStore, PropertyDiff};
use crate::clock::{Clock, SystemClock};
use crate::config::FeatureLockingConfig;
use crate::domain::locking::FeatureLockRepository;
use crate::error::Result;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Facade over lock status and lock properties
#[derive(Debug, Clone)]
pub struct UserFeatureManager {
    locks: FeatureLockManager,
    properties: FeaturePropertyStore,
}

impl UserFeatureManager {
    /// Create a manager backed by SQLite and the system clock
    pub fn new(pool: SqlitePool, config: FeatureLockingConfig) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock), config)
    }

    /// Create a manager backed by SQLite with a custom clock
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>, config: FeatureLockingConfig) -> Self {
        Self {
            locks: FeatureLockManager::with_repository(
                Arc::new(FeatureLockRepository::new(pool.clone())),
                clock,
                config,
            ),
            properties: FeaturePropertyStore::new(pool, config),
        }
    }

    /// Assemble from already-built components
    pub fn from_parts(locks: FeatureLockManager, properties: FeaturePropertyStore) -> Self {
        Self { locks, properties }
    }

    pub fn locks(&self) -> &FeatureLockManager {
        &self.locks
    }

    pub fn properties(&self) -> &FeaturePropertyStore {
        &self.properties
    }

    pub async fn get_feature_lock_status(&self, key: &FeatureKey) -> Result<FeatureLock> {
        self.locks.get_status(key).await
    }

    pub async fn lock_feature(
        &self,
        key: &FeatureKey,
        time_to_lock_ms: i64,
        reason_code: Option<&str>,
        reason: Option<&str>,
    ) -> Result<LockOutcome> {
        self.locks.lock(key, time_to_lock_ms, reason_code, reason).await
    }

    pub async fn unlock_feature(&self, key: &FeatureKey) -> Result<()> {
        self.locks.unlock(key).await
    }

    pub async fn get_feature_properties(&self, key: &FeatureKey) -> Result<HashMap<String, String>> {
        self.properties.get_all_properties(key).await
    }

    pub async fn set_feature_properties(
        &self,
        key: &FeatureKey,
        properties: &HashMap<String, String>,
    ) -> Result<PropertyDiff> {
        self.properties.set_properties(key, properties).await
    }

    pub async fn delete_feature_properties(
        &self,
        key: &FeatureKey,
        names: &HashSet<String>,
    ) -> Result<()> {
        self.properties.delete_properties(key, names).await
    }

    pub async fn delete_all_feature_properties(&self, key: &FeatureKey) -> Result<()> {
        self.properties.delete_all_properties(key).await
    }
}
