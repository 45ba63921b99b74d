//! Identity triple shared by locks and properties

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one feature for one user within one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    pub user_id: String,
    pub tenant_id: i32,
    pub feature_id: String,
}

impl FeatureKey {
    pub fn new(user_id: impl Into<String>, tenant_id: i32, feature_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id,
            feature_id: feature_id.into(),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user_id, self.tenant_id, self.feature_id)
    }
}
