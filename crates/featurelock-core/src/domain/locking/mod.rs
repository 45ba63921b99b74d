//! Per-user feature locks
//!
//! A lock states that a named feature is denied to a user within a tenant
//! until a given time, or indefinitely.
//!
//! # Lifecycle
//!
//! - **Read**: expired rows are deleted when observed and reported as unlocked
//! - **Lock**: creates the row, overwrites an inactive row, or extends an
//!   active one only when the new unlock time is strictly later
//! - **Unlock**: deletes the row; idempotent
//!
//! # Example
//!
//! ```ignore
//! use featurelock_core::domain::locking::{FeatureKey, FeatureLockManager};
//!
//! let manager = FeatureLockManager::new(pool, config);
//! let key = FeatureKey::new("alice", 1, "sms-otp");
//! manager.lock(&key, 300_000, Some("MAX_ATTEMPTS"), Some("Too many attempts")).await?;
//! assert!(manager.get_status(&key).await?.locked);
//! ```

pub mod manager;
pub mod repository;
pub mod repository_trait;
pub mod types;

// Re-export main types
pub use super::key::FeatureKey;
pub use manager::FeatureLockManager;
pub use repository::FeatureLockRepository;
pub use repository_trait::FeatureLockRepositoryTrait;
pub use types::{FeatureLock, LOCKED_INDEFINITELY, LockOutcome};
