//! Feature lock repository for database operations
//!
//! Handles all database interactions for the `user_feature_locks` table.

use super::repository_trait::FeatureLockRepositoryTrait;
use super::types::FeatureLock;
use crate::domain::key::FeatureKey;
use crate::error::{Result, store_failure};
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for feature lock database operations
#[derive(Debug, Clone)]
pub struct FeatureLockRepository {
    pool: SqlitePool,
}

impl FeatureLockRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch the lock row for a triple
    pub async fn get(&self, key: &FeatureKey) -> Result<Option<FeatureLock>> {
        let row: Option<FeatureLockRow> = sqlx::query_as(
            r#"
            SELECT is_feature_locked, feature_unlock_time, feature_lock_reason_code, feature_lock_reason
            FROM user_feature_locks
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while retrieving feature lock status from DB for feature id: {}, user Id: {} and tenant Id: {}.",
                    key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(row.map(FeatureLockRow::into_lock))
    }

    /// Insert a lock row
    pub async fn insert(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO user_feature_locks (id, user_id, tenant_id, feature_id, is_feature_locked,
                feature_unlock_time, feature_lock_reason, feature_lock_reason_code)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .bind(lock.locked)
        .bind(lock.unlock_time_ms)
        .bind(&lock.reason)
        .bind(&lock.reason_code)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while adding the feature: {}, for user: {}, for tenant id: {}, having the parameters, \
                     feature lock status: {}, feature unlock time: {}, feature lock reason code: {}, feature lock reason: {}.",
                    key.feature_id,
                    key.user_id,
                    key.tenant_id,
                    lock.locked,
                    lock.unlock_time_ms,
                    lock.reason_code.as_deref().unwrap_or("null"),
                    lock.reason.as_deref().unwrap_or("null"),
                ),
                e,
            )
        })?;

        Ok(())
    }

    /// Overwrite the lock row for a triple
    pub async fn update(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_feature_locks
            SET is_feature_locked = ?, feature_unlock_time = ?, feature_lock_reason = ?, feature_lock_reason_code = ?
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ?
            "#,
        )
        .bind(lock.locked)
        .bind(lock.unlock_time_ms)
        .bind(&lock.reason)
        .bind(&lock.reason_code)
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while updating the feature: {} for user Id: {} and tenant Id: {}.",
                    key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(())
    }

    /// Delete the lock row for a triple
    pub async fn delete(&self, key: &FeatureKey) -> Result<()> {
        sqlx::query(
            "DELETE FROM user_feature_locks WHERE user_id = ? AND tenant_id = ? AND feature_id = ?",
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while deleting feature from DB for feature Id: {}, user Id: {} and tenant Id: {}.",
                    key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(())
    }

    /// Delete the lock row for a triple if it expired before `now_ms`
    pub async fn delete_expired(&self, key: &FeatureKey, now_ms: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_feature_locks
            WHERE user_id = ? AND tenant_id = ? AND feature_id = ? AND feature_unlock_time < ?
            "#,
        )
        .bind(&key.user_id)
        .bind(key.tenant_id)
        .bind(&key.feature_id)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            store_failure(
                format!(
                    "Error occurred while deleting expired feature lock from DB for feature Id: {}, user Id: {} and tenant Id: {}.",
                    key.feature_id, key.user_id, key.tenant_id
                ),
                e,
            )
        })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FeatureLockRepositoryTrait for FeatureLockRepository {
    async fn get(&self, key: &FeatureKey) -> Result<Option<FeatureLock>> {
        self.get(key).await
    }

    async fn insert(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
        self.insert(key, lock).await
    }

    async fn update(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
        self.update(key, lock).await
    }

    async fn delete(&self, key: &FeatureKey) -> Result<()> {
        self.delete(key).await
    }

    async fn delete_expired(&self, key: &FeatureKey, now_ms: i64) -> Result<bool> {
        self.delete_expired(key, now_ms).await
    }
}

/// Database row for a feature lock
#[derive(sqlx::FromRow)]
struct FeatureLockRow {
    is_feature_locked: bool,
    feature_unlock_time: i64,
    feature_lock_reason_code: Option<String>,
    feature_lock_reason: Option<String>,
}

impl FeatureLockRow {
    fn into_lock(self) -> FeatureLock {
        FeatureLock {
            locked: self.is_feature_locked,
            unlock_time_ms: self.feature_unlock_time,
            reason_code: self.feature_lock_reason_code,
            reason: self.feature_lock_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::locking::LOCKED_INDEFINITELY;
    use crate::error::Error;
    use crate::storage::Database;

    async fn create_test_repo() -> FeatureLockRepository {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        FeatureLockRepository::new(db.pool().clone())
    }

    fn key() -> FeatureKey {
        FeatureKey::new("alice", 1, "sms-otp")
    }

    #[tokio::test]
    async fn test_get_missing_row() {
        let repo = create_test_repo().await;
        assert!(repo.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = create_test_repo().await;
        let lock = FeatureLock::locked_until(
            42_000,
            Some("MAX_ATTEMPTS".to_string()),
            Some("Too many attempts".to_string()),
        );

        repo.insert(&key(), &lock).await.expect("Failed to insert");

        let stored = repo.get(&key()).await.unwrap().expect("Row not found");
        assert_eq!(stored, lock);
    }

    #[tokio::test]
    async fn test_indefinite_sentinel_survives_storage() {
        let repo = create_test_repo().await;
        let lock = FeatureLock::locked_until(LOCKED_INDEFINITELY, None, None);
        repo.insert(&key(), &lock).await.unwrap();

        let stored = repo.get(&key()).await.unwrap().unwrap();
        assert_eq!(stored.unlock_time_ms, i64::MAX);
        assert!(stored.reason.is_none());
    }

    #[tokio::test]
    async fn test_update_overwrites_row() {
        let repo = create_test_repo().await;
        repo.insert(&key(), &FeatureLock::locked_until(1, Some("A".into()), None))
            .await
            .unwrap();

        let updated = FeatureLock::locked_until(2, Some("B".into()), Some("second".into()));
        repo.update(&key(), &updated).await.unwrap();

        assert_eq!(repo.get(&key()).await.unwrap().unwrap(), updated);
    }

    #[tokio::test]
    async fn test_rows_are_scoped_by_triple() {
        let repo = create_test_repo().await;
        repo.insert(&key(), &FeatureLock::locked_until(10, None, None))
            .await
            .unwrap();

        assert!(repo.get(&FeatureKey::new("alice", 2, "sms-otp")).await.unwrap().is_none());
        assert!(repo.get(&FeatureKey::new("bob", 1, "sms-otp")).await.unwrap().is_none());
        assert!(repo.get(&FeatureKey::new("alice", 1, "totp")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = create_test_repo().await;
        repo.insert(&key(), &FeatureLock::locked_until(10, None, None))
            .await
            .unwrap();

        repo.delete(&key()).await.unwrap();
        assert!(repo.get(&key()).await.unwrap().is_none());

        repo.delete(&key()).await.expect("Second delete should not fail");
    }

    #[tokio::test]
    async fn test_delete_expired_checks_unlock_time() {
        let repo = create_test_repo().await;
        repo.insert(&key(), &FeatureLock::locked_until(100, None, None))
            .await
            .unwrap();

        // Not yet expired at its own unlock time
        assert!(!repo.delete_expired(&key(), 100).await.unwrap());
        assert!(repo.get(&key()).await.unwrap().is_some());

        assert!(repo.delete_expired(&key(), 101).await.unwrap());
        assert!(repo.get(&key()).await.unwrap().is_none());

        // Missing row
        assert!(!repo.delete_expired(&key(), 101).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired_spares_indefinite_lock() {
        let repo = create_test_repo().await;
        repo.insert(&key(), &FeatureLock::locked_until(LOCKED_INDEFINITELY, None, None))
            .await
            .unwrap();

        assert!(!repo.delete_expired(&key(), i64::MAX).await.unwrap());
        assert!(repo.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_wrapped() {
        let repo = create_test_repo().await;
        let lock = FeatureLock::locked_until(10, Some("CODE".into()), None);
        repo.insert(&key(), &lock).await.unwrap();

        let err = repo.insert(&key(), &lock).await.unwrap_err();
        assert_eq!(err.code(), "E400");
        let message = err.to_string();
        assert!(message.contains("sms-otp"));
        assert!(message.contains("alice"));
        assert!(message.contains("tenant id: 1"));
        assert!(message.contains("CODE"));
        assert!(matches!(err, Error::Management { .. }));
    }

    #[tokio::test]
    async fn test_closed_pool_is_wrapped() {
        let repo = create_test_repo().await;
        repo.pool().close().await;

        let err = repo.get(&key()).await.unwrap_err();
        assert!(err.to_string().contains("retrieving feature lock status"));
    }
}
