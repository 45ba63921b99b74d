//! Error types for featurelock

use thiserror::Error;
use tracing::debug;

/// Result type alias using featurelock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Featurelock error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Management errors (E400-E499)
    /// A record-store statement failed. The message names the offending
    /// user, tenant, feature and (where relevant) property.
    #[error("{message}")]
    Management {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    // Config errors (E600-E699)
    #[error("Per-user feature locking is not enabled.")]
    FeatureLockingDisabled,
}

impl Error {
    /// Wrap a record-store failure with a diagnostic message
    pub fn management(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Management {
            message: message.into(),
            source,
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Management { .. } => "E400",
            Self::FeatureLockingDisabled => "E600",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::FeatureLockingDisabled => {
                Some("featurelock config set feature_locking.per_user_enabled true".to_string())
            }
            Self::Management { .. } => None,
        }
    }

    /// Whether this error means the subsystem is administratively disabled
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::FeatureLockingDisabled)
    }
}

/// Wrap a record-store failure, logging it at debug level first
pub(crate) fn store_failure(message: String, source: sqlx::Error) -> Error {
    debug!(error = %source, "{}", message);
    Error::management(message, source)
}
