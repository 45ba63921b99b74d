//! Feature lock property repository for database operations
//!
//! Handles all database interactions for the `user_feature_lock_properties` table.

use super::repository_trait::FeaturePropertyRepositoryTrait;
use crate::domain::key::FeatureKey;
use crate::error::{Result, store_failure};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Repository for feature lock property database operations
#[derive(Debug, Clone)]
pub struct FeaturePropertyRepository {
    pool: SqlitePool,
}

impl FeaturePropertyRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get all properties for a triple
    pub async fn get_all(&self, key: &FeatureKey) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT property_name, property_value
            FROM user_feature_lock_properties
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while retrieving feature lock properties from DB for user Id: {}, tenant Id: {} and feature id: {}.",
                    key.user_id, key.tenant_id, key.feature_id
                ),
                e,
            )
        })?;

        Ok(rows.into_iter().collect())
    }

    /// Get a single property value
    pub async fn get(&self, key: &FeatureKey, name: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT property_value
            FROM user_feature_lock_properties
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ? AND property_name = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while retrieving the feature lock property: {} for feature Id: {}, user Id: {} and tenant Id: {}.",
                    name, key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(row.map(|(value,)| value))
    }

    /// Insert properties one by one in name order, stopping at the first failure
    pub async fn add(&self, key: &FeatureKey, properties: &HashMap<String, String>) -> Result<()> {
        for (name, value) in in_name_order(properties) {
            let id = Uuid::new_v4().to_string();

            sqlx::query(
                r#"
                INSERT INTO user_feature_lock_properties (id, user_id, tenant_id, feature_id, property_name, property_value)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&key.user_id)
            .bind(key.tenant_id)
            .bind(&key.feature_id)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                store_failure(
                    format!(
                        "Error occurred while adding the property: {} for feature: {} in user: {}, tenant id: {}",
                        name, key.feature_id, key.user_id, key.tenant_id
                    ),
                    e,
                )
            })?;
        }

        Ok(())
    }

    /// Update property values one by one in name order, stopping at the first failure
    pub async fn update(
        &self,
        key: &FeatureKey,
        properties: &HashMap<String, String>,
    ) -> Result<()> {
        for (name, value) in in_name_order(properties) {
            sqlx::query(
                r#"
                UPDATE user_feature_lock_properties
                SET property_value = ?
                WHERE user_id = ? AND tenant_id = ? AND feature_id = ? AND property_name = ?
                "#,
            )
            .bind(value)
            .bind(&key.user_id)
            .bind(key.tenant_id)
            .bind(&key.feature_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                store_failure(
                    format!(
                        "Error occurred while updating the feature lock property: {} for feature Id: {}, user Id: {} and tenantId: {}.",
                        name, key.feature_id, key.user_id, key.tenant_id
                    ),
                    e,
                )
            })?;
        }

        Ok(())
    }

    /// Delete the named properties one by one, stopping at the first failure
    pub async fn delete(&self, key: &FeatureKey, names: &HashSet<String>) -> Result<()> {
        for name in names {
            sqlx::query(
                r#"
                DELETE FROM user_feature_lock_properties
                WHERE user_id = ? AND tenant_id = ? AND feature_id = ? AND property_name = ?
                "#,
            )
            .bind(&key.user_id)
            .bind(key.tenant_id)
            .bind(&key.feature_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                store_failure(
                    format!(
                        "Error occurred while deleting feature lock property from DB for feature Id: {}, property: {}, user Id: {} and tenant Id: {}.",
                        key.feature_id, name, key.user_id, key.tenant_id
                    ),
                    e,
                )
            })?;
        }

        Ok(())
    }

    /// Delete every property for a triple
    pub async fn delete_all(&self, key: &FeatureKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM user_feature_lock_properties
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while deleting feature lock properties from DB for feature Id: {}, user Id: {} and tenant Id: {}.",
                    key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(())
    }
}

/// Batches run in a fixed order so a failure leaves a predictable prefix written
fn in_name_order(properties: &HashMap<String, String>) -> BTreeMap<&String, &String> {
    properties.iter().collect()
}

#[async_trait]
impl FeaturePropertyRepositoryTrait for FeaturePropertyRepository {
    async fn get_all(&self, key: &FeatureKey) -> Result<HashMap<String, String>> {
        self.get_all(key).await
    }

    async fn get(&self, key: &FeatureKey, name: &str) -> Result<Option<String>> {
        self.get(key, name).await
    }

    async fn add(&self, key: &FeatureKey, properties: &HashMap<String, String>) -> Result<()> {
        self.add(key, properties).await
    }

    async fn update(&self, key: &FeatureKey, properties: &HashMap<String, String>) -> Result<()> {
        self.update(key, properties).await
    }

    async fn delete(&self, key: &FeatureKey, names: &HashSet<String>) -> Result<()> {
        self.delete(key, names).await
    }

    async fn delete_all(&self, key: &FeatureKey) -> Result<()> {
        self.delete_all(key).await
    }
}
