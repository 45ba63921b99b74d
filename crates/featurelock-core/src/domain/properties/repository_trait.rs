//! Repository trait for feature lock property persistence

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::domain::key::FeatureKey;
use crate::error::Result;

/// Repository trait for the property table
///
/// The batch methods work key by key; the first failing key aborts the rest
/// of the call and earlier keys stay applied.
#[async_trait]
pub trait FeaturePropertyRepositoryTrait: Send + Sync {
    /// All properties for the triple; empty when none exist
    async fn get_all(&self, key: &FeatureKey) -> Result<HashMap<String, String>>;

    /// Value of a single property
    async fn get(&self, key: &FeatureKey, name: &str) -> Result<Option<String>>;

    /// Insert properties that do not exist yet
    async fn add(&self, key: &FeatureKey, properties: &HashMap<String, String>) -> Result<()>;

    /// Replace the values of existing properties
    async fn update(&self, key: &FeatureKey, properties: &HashMap<String, String>) -> Result<()>;

    /// Delete the named properties; missing names are skipped
    async fn delete(&self, key: &FeatureKey, names: &HashSet<String>) -> Result<()>;

    /// Delete every property for the triple
    async fn delete_all(&self, key: &FeatureKey) -> Result<()>;
}
