//! Featurelock Core Library
//!
//! This crate answers one question for a `(user, tenant, feature)` triple:
//! is the feature currently locked, why, until when, and with what metadata.
//!
//! - Lock lifecycle (lazy expiry, monotonic extension on re-lock)
//! - Property bag per lock identity with diff-based upsert
//! - Storage (SQLite via sqlx, versioned migrations)
//! - Configuration (TOML file + environment overrides)

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{Config, FeatureLockingConfig};
    pub use crate::domain::UserFeatureManager;
    pub use crate::domain::locking::{FeatureKey, FeatureLock, FeatureLockManager, LockOutcome};
    pub use crate::domain::properties::{FeaturePropertyStore, PropertyDiff};
    pub use crate::error::{Error, Result};
}
