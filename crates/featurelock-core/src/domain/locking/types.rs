//! Lock status model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unlock time sentinel for a lock with no expiry
pub const LOCKED_INDEFINITELY: i64 = i64::MAX;

/// Lock status of one feature for one user
///
/// The absence of a stored row is reported as [`FeatureLock::UNLOCKED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLock {
    pub locked: bool,
    /// Epoch milliseconds; only meaningful while `locked` is true
    pub unlock_time_ms: i64,
    pub reason_code: Option<String>,
    pub reason: Option<String>,
}

impl FeatureLock {
    /// Canonical value for a feature with no active lock
    pub const UNLOCKED: FeatureLock = FeatureLock {
        locked: false,
        unlock_time_ms: 0,
        reason_code: None,
        reason: None,
    };

    /// Create an active lock expiring at `unlock_time_ms`
    pub fn locked_until(
        unlock_time_ms: i64,
        reason_code: Option<String>,
        reason: Option<String>,
    ) -> Self {
        Self {
            locked: true,
            unlock_time_ms,
            reason_code,
            reason,
        }
    }

    /// Whether the unlock time lies strictly before `now_ms`
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.unlock_time_ms < now_ms
    }

    pub fn is_indefinite(&self) -> bool {
        self.unlock_time_ms == LOCKED_INDEFINITELY
    }

    /// Unlock time as a timestamp, `None` for the zero value and the
    /// indefinite sentinel
    pub fn unlock_time(&self) -> Option<DateTime<Utc>> {
        if self.unlock_time_ms == 0 || self.is_indefinite() {
            return None;
        }
        DateTime::from_timestamp_millis(self.unlock_time_ms)
    }
}

impl Default for FeatureLock {
    fn default() -> Self {
        Self::UNLOCKED
    }
}

impl fmt::Display for FeatureLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.locked {
            return write!(f, "unlocked");
        }
        if self.is_indefinite() {
            write!(f, "locked indefinitely")?;
        } else {
            match self.unlock_time() {
                Some(at) => write!(f, "locked until {}", at.to_rfc3339())?,
                None => write!(f, "locked until {}ms", self.unlock_time_ms)?,
            }
        }
        if let Some(code) = &self.reason_code {
            write!(f, " [{}]", code)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

/// Which branch of the lock merge policy applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOutcome {
    /// No row existed; a new lock was inserted
    Created,
    /// An inactive row was overwritten with an active lock
    Relocked,
    /// An active lock was pushed to a strictly later unlock time
    Extended,
    /// An active lock already lasted at least as long; nothing was written
    Unchanged,
}

impl LockOutcome {
    /// Whether the call wrote to the record store
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Relocked => "relocked",
            Self::Extended => "extended",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for LockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
