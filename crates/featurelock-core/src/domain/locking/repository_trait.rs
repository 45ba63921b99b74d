//! Repository trait for feature lock persistence
//!
//! The trait abstracts over record-store backends. Implementations wrap every
//! backend failure into [`crate::Error::Management`].

use async_trait::async_trait;

use crate::error::Result;

use super::types::FeatureLock;
use crate::domain::key::FeatureKey;

/// Repository trait for the lock table
#[async_trait]
pub trait FeatureLockRepositoryTrait: Send + Sync {
    /// Fetch the stored row, `None` when the triple has no row
    async fn get(&self, key: &FeatureKey) -> Result<Option<FeatureLock>>;

    /// Insert a new row with a freshly generated surrogate id
    async fn insert(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()>;

    /// Overwrite the row for the triple
    async fn update(&self, key: &FeatureKey, lock: &FeatureLock) -> Result<()>;

    /// Delete the row for the triple; deleting a missing row is not an error
    async fn delete(&self, key: &FeatureKey) -> Result<()>;

    /// Delete the row only if its unlock time is still earlier than `now_ms`.
    ///
    /// Returns `true` when a row was removed. A row rewritten after the
    /// caller's read no longer matches and is left in place.
    async fn delete_expired(&self, key: &FeatureKey, now_ms: i64) -> Result<bool>;
}
