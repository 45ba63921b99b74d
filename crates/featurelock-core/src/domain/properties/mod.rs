//! Key/value properties attached to a feature lock identity
//!
//! Properties share the `(user, tenant, feature)` key with locks but live in
//! their own table: removing a lock leaves its properties in place and vice
//! versa.

pub mod repository;
pub mod repository_trait;
pub mod store;

pub use super::key::FeatureKey;
pub use repository::FeaturePropertyRepository;
pub use repository_trait::FeaturePropertyRepositoryTrait;
pub use store::{FeaturePropertyStore, PropertyDiff};
