//! Domain layer
//!
//! - `locking`: lock lifecycle per `(user, tenant, feature)`
//! - `properties`: key/value metadata per lock identity
//! - `service`: facade bundling both behind one configuration

pub mod key;
pub mod locking;
pub mod properties;
pub mod service;

pub use key::FeatureKey;
pub use service::UserFeatureManager;
