//! Lock manager for per-user feature locks
//!
//! The manager owns the lock lifecycle:
//! - Read with lazy expiry (an expired row is deleted when observed)
//! - Lock with "longest lock wins" merging
//! - Idempotent unlock
//!
//! It holds no state between calls apart from its collaborators. Two callers
//! locking the same triple concurrently may race between the read and the
//! write; each re-reads before deciding, so the result is whichever monotonic
//! check ran last.

use super::repository::FeatureLockRepository;
use super::repository_trait::FeatureLockRepositoryTrait;
use super::types::{FeatureLock, LOCKED_INDEFINITELY, LockOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::FeatureLockingConfig;
use crate::domain::key::FeatureKey;
use crate::error::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

/// Lock manager for per-user feature locks
#[derive(Clone)]
pub struct FeatureLockManager {
    repository: Arc<dyn FeatureLockRepositoryTrait>,
    clock: Arc<dyn Clock>,
    config: FeatureLockingConfig,
}

impl FeatureLockManager {
    /// Create a manager backed by SQLite and the system clock
    pub fn new(pool: SqlitePool, config: FeatureLockingConfig) -> Self {
        Self::with_repository(
            Arc::new(FeatureLockRepository::new(pool)),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Create a manager over an arbitrary record store and clock
    pub fn with_repository(
        repository: Arc<dyn FeatureLockRepositoryTrait>,
        clock: Arc<dyn Clock>,
        config: FeatureLockingConfig,
    ) -> Self {
        Self {
            repository,
            clock,
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &FeatureLockingConfig {
        &self.config
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.per_user_enabled {
            Ok(())
        } else {
            Err(Error::FeatureLockingDisabled)
        }
    }

    /// Current lock status of a feature
    ///
    /// A missing row and an expired row both report [`FeatureLock::UNLOCKED`];
    /// the expired row is deleted on the way out. Any other row is returned
    /// as stored.
    ///
    /// The purge only removes a row that is still expired at delete time, so
    /// a lock written after the read survives and is returned instead.
    pub async fn get_status(&self, key: &FeatureKey) -> Result<FeatureLock> {
        self.ensure_enabled()?;

        let Some(status) = self.repository.get(key).await? else {
            return Ok(FeatureLock::UNLOCKED);
        };

        let now = self.clock.now_millis();
        if !status.is_expired_at(now) {
            return Ok(status);
        }

        debug!(
            key = %key,
            unlock_time_ms = status.unlock_time_ms,
            now_ms = now,
            "Removing expired feature lock"
        );
        if self.repository.delete_expired(key, now).await? {
            return Ok(FeatureLock::UNLOCKED);
        }

        // Rewritten since the read
        match self.repository.get(key).await? {
            Some(current) if !current.is_expired_at(now) => {
                debug!(key = %key, "Expired feature lock was replaced before purge");
                Ok(current)
            }
            _ => Ok(FeatureLock::UNLOCKED),
        }
    }

    /// Lock a feature for `time_to_lock_ms` milliseconds
    ///
    /// A negative duration locks indefinitely. An active lock is only
    /// replaced when the new unlock time is strictly later; a shorter or
    /// equal request leaves the existing lock and its reason untouched.
    pub async fn lock(
        &self,
        key: &FeatureKey,
        time_to_lock_ms: i64,
        reason_code: Option<&str>,
        reason: Option<&str>,
    ) -> Result<LockOutcome> {
        self.ensure_enabled()?;

        let unlock_time_ms = if time_to_lock_ms < 0 {
            LOCKED_INDEFINITELY
        } else {
            self.clock.now_millis().saturating_add(time_to_lock_ms)
        };
        let new_lock = FeatureLock::locked_until(
            unlock_time_ms,
            reason_code.map(str::to_string),
            reason.map(str::to_string),
        );

        let outcome = match self.repository.get(key).await? {
            None => {
                self.repository.insert(key, &new_lock).await?;
                LockOutcome::Created
            }
            Some(existing) if !existing.locked => {
                self.repository.update(key, &new_lock).await?;
                LockOutcome::Relocked
            }
            Some(existing) if existing.unlock_time_ms < unlock_time_ms => {
                self.repository.update(key, &new_lock).await?;
                LockOutcome::Extended
            }
            Some(existing) => {
                debug!(
                    key = %key,
                    existing_unlock_time_ms = existing.unlock_time_ms,
                    requested_unlock_time_ms = unlock_time_ms,
                    "Existing lock outlasts request"
                );
                LockOutcome::Unchanged
            }
        };

        if outcome.is_write() {
            info!(
                key = %key,
                unlock_time_ms = unlock_time_ms,
                reason_code = reason_code.unwrap_or(""),
                outcome = %outcome,
                "Feature locked"
            );
        }

        Ok(outcome)
    }

    /// Remove any lock on a feature; unlocking an unlocked feature is a no-op
    pub async fn unlock(&self, key: &FeatureKey) -> Result<()> {
        self.ensure_enabled()?;

        self.repository.delete(key).await?;
        info!(key = %key, "Feature unlocked");
        Ok(())
    }
}

impl std::fmt::Debug for FeatureLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureLockManager")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_700_000_000_000;

    async fn create_manager() -> (FeatureLockManager, FeatureLockRepository, Arc<ManualClock>) {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        let repository = FeatureLockRepository::new(db.pool().clone());
        let clock = Arc::new(ManualClock::new(NOW));
        let manager = FeatureLockManager::with_repository(
            Arc::new(repository.clone()),
            clock.clone(),
            FeatureLockingConfig::enabled(),
        );
        (manager, repository, clock)
    }

    fn key() -> FeatureKey {
        FeatureKey::new("alice", 1, "sms-otp")
    }

    #[tokio::test]
    async fn test_status_without_row_is_unlocked() {
        let (manager, _, _) = create_manager().await;
        let status = manager.get_status(&key()).await.unwrap();
        assert_eq!(status, FeatureLock::UNLOCKED);
    }

    #[tokio::test]
    async fn test_lock_then_status() {
        let (manager, _, _) = create_manager().await;

        let outcome = manager
            .lock(&key(), 300_000, Some("MAX_ATTEMPTS"), Some("Too many attempts"))
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Created);

        let status = manager.get_status(&key()).await.unwrap();
        assert!(status.locked);
        assert_eq!(status.unlock_time_ms, NOW + 300_000);
        assert_eq!(status.reason_code.as_deref(), Some("MAX_ATTEMPTS"));
        assert_eq!(status.reason.as_deref(), Some("Too many attempts"));
    }

    #[tokio::test]
    async fn test_negative_duration_locks_indefinitely() {
        let (manager, _, clock) = create_manager().await;

        manager.lock(&key(), -1, Some("ADMIN"), None).await.unwrap();
        clock.advance(10 * 365 * 24 * 3_600_000);

        let status = manager.get_status(&key()).await.unwrap();
        assert!(status.locked);
        assert_eq!(status.unlock_time_ms, LOCKED_INDEFINITELY);

        // Any negative value means indefinite
        let other = FeatureKey::new("bob", 1, "sms-otp");
        manager.lock(&other, -42, None, None).await.unwrap();
        assert!(manager.get_status(&other).await.unwrap().is_indefinite());
    }

    #[tokio::test]
    async fn test_shorter_relock_keeps_longer_lock() {
        let (manager, _, _) = create_manager().await;

        manager.lock(&key(), 300_000, Some("FIRST"), Some("first")).await.unwrap();
        let outcome = manager
            .lock(&key(), 100_000, Some("SECOND"), Some("second"))
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Unchanged);

        let status = manager.get_status(&key()).await.unwrap();
        assert_eq!(status.unlock_time_ms, NOW + 300_000);
        assert_eq!(status.reason_code.as_deref(), Some("FIRST"));
    }

    #[tokio::test]
    async fn test_equal_relock_is_noop() {
        let (manager, _, _) = create_manager().await;

        manager.lock(&key(), 1_000, Some("FIRST"), None).await.unwrap();
        let outcome = manager.lock(&key(), 1_000, Some("SECOND"), None).await.unwrap();
        assert_eq!(outcome, LockOutcome::Unchanged);
        assert_eq!(
            manager.get_status(&key()).await.unwrap().reason_code.as_deref(),
            Some("FIRST")
        );
    }

    #[tokio::test]
    async fn test_longer_relock_extends() {
        let (manager, _, clock) = create_manager().await;

        manager.lock(&key(), 100_000, Some("FIRST"), None).await.unwrap();
        clock.advance(1_000);
        let outcome = manager
            .lock(&key(), 300_000, Some("SECOND"), Some("longer"))
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Extended);

        let status = manager.get_status(&key()).await.unwrap();
        assert_eq!(status.unlock_time_ms, NOW + 1_000 + 300_000);
        assert_eq!(status.reason_code.as_deref(), Some("SECOND"));
        assert_eq!(status.reason.as_deref(), Some("longer"));
    }

    #[tokio::test]
    async fn test_indefinite_lock_is_never_shortened() {
        let (manager, _, _) = create_manager().await;

        manager.lock(&key(), -1, Some("ADMIN"), None).await.unwrap();
        let outcome = manager.lock(&key(), i64::MAX, Some("LATER"), None).await.unwrap();
        assert_eq!(outcome, LockOutcome::Unchanged);
        assert_eq!(
            manager.get_status(&key()).await.unwrap().reason_code.as_deref(),
            Some("ADMIN")
        );
    }

    #[tokio::test]
    async fn test_huge_duration_saturates() {
        let (manager, _, _) = create_manager().await;
        manager.lock(&key(), i64::MAX - 1, None, None).await.unwrap();
        assert!(manager.get_status(&key()).await.unwrap().is_indefinite());
    }

    #[tokio::test]
    async fn test_inactive_row_is_always_overwritten() {
        let (manager, repository, _) = create_manager().await;

        // An explicitly unlocked row with a far-future time still loses to a lock
        let inactive = FeatureLock {
            locked: false,
            unlock_time_ms: NOW + 10_000_000,
            reason_code: Some("OLD".into()),
            reason: None,
        };
        repository.insert(&key(), &inactive).await.unwrap();

        let outcome = manager.lock(&key(), 5_000, Some("NEW"), None).await.unwrap();
        assert_eq!(outcome, LockOutcome::Relocked);

        let status = manager.get_status(&key()).await.unwrap();
        assert!(status.locked);
        assert_eq!(status.unlock_time_ms, NOW + 5_000);
        assert_eq!(status.reason_code.as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn test_inactive_unexpired_row_is_returned_verbatim() {
        let (manager, repository, _) = create_manager().await;
        let inactive = FeatureLock {
            locked: false,
            unlock_time_ms: NOW + 1,
            reason_code: None,
            reason: Some("kept".into()),
        };
        repository.insert(&key(), &inactive).await.unwrap();

        assert_eq!(manager.get_status(&key()).await.unwrap(), inactive);
    }

    #[tokio::test]
    async fn test_expired_lock_is_purged_on_read() {
        let (manager, repository, clock) = create_manager().await;

        manager.lock(&key(), 1_000, Some("SHORT"), None).await.unwrap();

        // Exactly at the unlock time the lock still holds
        clock.advance(1_000);
        assert!(manager.get_status(&key()).await.unwrap().locked);

        clock.advance(1);
        let status = manager.get_status(&key()).await.unwrap();
        assert_eq!(status, FeatureLock::UNLOCKED);

        // The row is physically gone
        assert!(repository.get(&key()).await.unwrap().is_none());
        assert_eq!(manager.get_status(&key()).await.unwrap().unlock_time_ms, 0);
    }

    #[tokio::test]
    async fn test_lock_after_expiry_extends_stale_row() {
        let (manager, _, clock) = create_manager().await;

        manager.lock(&key(), 1_000, None, None).await.unwrap();
        clock.advance(2_000);

        // Without an intervening read the stale row is still stored and active,
        // but its unlock time is earlier than the new one
        let outcome = manager.lock(&key(), 1_000, None, None).await.unwrap();
        assert_eq!(outcome, LockOutcome::Extended);
        assert_eq!(
            manager.get_status(&key()).await.unwrap().unlock_time_ms,
            NOW + 3_000
        );
    }

    #[tokio::test]
    async fn test_unlock() {
        let (manager, repository, _) = create_manager().await;

        manager.lock(&key(), -1, None, None).await.unwrap();
        manager.unlock(&key()).await.unwrap();

        assert_eq!(manager.get_status(&key()).await.unwrap(), FeatureLock::UNLOCKED);
        assert!(repository.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlock_never_locked_is_noop() {
        let (manager, _, _) = create_manager().await;
        manager.unlock(&key()).await.expect("Unlock should not fail");
        manager.unlock(&key()).await.expect("Unlock should not fail");
    }

    /// Record store double that counts calls and can be told to fail
    #[derive(Default)]
    struct CountingRepository {
        calls: AtomicUsize,
        fail: bool,
        stored: Option<FeatureLock>,
    }

    impl CountingRepository {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn holding(lock: FeatureLock) -> Self {
            Self {
                stored: Some(lock),
                ..Default::default()
            }
        }

        fn outcome<T>(&self, value: T) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::management("record store unavailable", sqlx::Error::PoolClosed))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl FeatureLockRepositoryTrait for CountingRepository {
        async fn get(&self, _key: &FeatureKey) -> Result<Option<FeatureLock>> {
            self.outcome(self.stored.clone())
        }

        async fn insert(&self, _key: &FeatureKey, _lock: &FeatureLock) -> Result<()> {
            self.outcome(())
        }

        async fn update(&self, _key: &FeatureKey, _lock: &FeatureLock) -> Result<()> {
            self.outcome(())
        }

        async fn delete(&self, _key: &FeatureKey) -> Result<()> {
            self.outcome(())
        }

        async fn delete_expired(&self, _key: &FeatureKey, _now_ms: i64) -> Result<bool> {
            self.outcome(self.stored.is_some())
        }
    }

    /// Record store that lets another writer relock the triple right after
    /// the next read, before the caller acts on what it read
    struct InterleavedRepository {
        inner: FeatureLockRepository,
        pending_write: std::sync::Mutex<Option<FeatureLock>>,
    }

    #[async_trait]
    impl FeatureLockRepositoryTrait for InterleavedRepository {
        async fn get(&self, key: &FeatureKey) -> Result<Option<FeatureLock>> {
            let row = self.inner.get(key).await?;
            let pending = self.pending_write.lock().unwrap().take();
            if let Some(lock) = pending {
                self.inner.update(key, &lock).await?;
            }
            Ok(row)
        }

        async fn insert(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
            self.inner.insert(key, lock).await
        }

        async fn update(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()> {
            self.inner.update(key, lock).await
        }

        async fn delete(&self, key: &FeatureKey) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn delete_expired(&self, key: &FeatureKey, now_ms: i64) -> Result<bool> {
            self.inner.delete_expired(key, now_ms).await
        }
    }

    #[tokio::test]
    async fn test_purge_keeps_lock_written_after_read() {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        let inner = FeatureLockRepository::new(db.pool().clone());
        inner
            .insert(&key(), &FeatureLock::locked_until(NOW - 100, Some("OLD".into()), None))
            .await
            .unwrap();

        let relock = FeatureLock::locked_until(LOCKED_INDEFINITELY, Some("NEW".into()), None);
        let repository = Arc::new(InterleavedRepository {
            inner: inner.clone(),
            pending_write: std::sync::Mutex::new(Some(relock.clone())),
        });
        let manager = FeatureLockManager::with_repository(
            repository,
            Arc::new(ManualClock::new(NOW)),
            FeatureLockingConfig::enabled(),
        );

        // The read sees the expired row; the relock lands before the purge
        let status = manager.get_status(&key()).await.unwrap();
        assert_eq!(status, relock);
        assert_eq!(inner.get(&key()).await.unwrap(), Some(relock));
    }

    #[tokio::test]
    async fn test_disabled_fails_before_storage() {
        let repository = Arc::new(CountingRepository::default());
        let manager = FeatureLockManager::with_repository(
            repository.clone(),
            Arc::new(ManualClock::new(NOW)),
            FeatureLockingConfig::disabled(),
        );

        assert!(manager.get_status(&key()).await.unwrap_err().is_disabled());
        assert!(manager.lock(&key(), 1, None, None).await.unwrap_err().is_disabled());
        assert!(manager.unlock(&key()).await.unwrap_err().is_disabled());
        assert_eq!(repository.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let repository = Arc::new(CountingRepository::failing());
        let manager = FeatureLockManager::with_repository(
            repository.clone(),
            Arc::new(ManualClock::new(NOW)),
            FeatureLockingConfig::enabled(),
        );

        let err = manager.lock(&key(), 1_000, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Management { .. }));
        // The failed read aborts before any write is attempted
        assert_eq!(repository.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unchanged_lock_performs_no_write() {
        let repository = Arc::new(CountingRepository::holding(FeatureLock::locked_until(
            NOW + 10_000,
            None,
            None,
        )));
        let manager = FeatureLockManager::with_repository(
            repository.clone(),
            Arc::new(ManualClock::new(NOW)),
            FeatureLockingConfig::enabled(),
        );

        let outcome = manager.lock(&key(), 5_000, None, None).await.unwrap();
        assert_eq!(outcome, LockOutcome::Unchanged);
        assert_eq!(repository.calls.load(Ordering::SeqCst), 1);
    }
}
