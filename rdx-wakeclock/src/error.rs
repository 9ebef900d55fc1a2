//! Error types for the Wakeclock core and its collaborators.
//!
//! Every failure is contained inside the handler that hit it. These types are
//! carried in the outcome enums so the dispatch shim can log them; none of them
//! is ever propagated to the host.

use chrono_tz::Tz;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The taxonomy of conditions the restorer and wake handler can run into.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WakeError {
    /// No alarm was ever configured.
    #[error("no alarm configured")]
    MissingConfig,

    /// A persisted hour or minute is outside its range.
    #[error("invalid alarm time {hour}:{minute}")]
    InvalidConfig {
        /// The stored hour.
        hour: i64,
        /// The stored minute.
        minute: i64,
    },

    /// A persisted value has the wrong type.
    #[error("invalid value for `{key}`: expected {expected}")]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// The expected value type.
        expected: &'static str,
    },

    /// The persisted zone name does not resolve to a known zone.
    #[error("unknown timezone `{tz_id}`, using {fallback}")]
    UnknownTimezone {
        /// The unresolvable zone name.
        tz_id: String,
        /// The zone used instead.
        fallback: Tz,
    },

    /// The platform refused to register an exact alarm.
    #[error("exact alarm permission denied: {0}")]
    SchedulingPermissionDenied(String),

    /// Generic registration failure.
    #[error("failed to register alarm: {0}")]
    SchedulingFailure(String),

    /// The illumination resource is missing or denied.
    #[error("illumination unavailable: {0}")]
    IlluminationUnavailable(String),

    /// The consumer application has no launch entry point.
    #[error("no launch target for the consumer application")]
    LaunchTargetMissing,

    /// The launch request was rejected.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// The persistence store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WakeError {
    /// Returns `true` for conditions that mean "nothing to do" rather than a fault.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::MissingConfig)
    }
}

/// Errors reported by a `PersistenceStore`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused the write.
    #[error("store write failed for `{key}`: {reason}")]
    WriteFailed {
        /// The key being written.
        key: String,
        /// The adapter's reason.
        reason: String,
    },
}

/// Errors reported by an `ExactAlarmScheduler`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The app lacks the grant for exact alarms.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other registration error.
    #[error("{0}")]
    Failure(String),
}

impl From<SchedulerError> for WakeError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::PermissionDenied(msg) => Self::SchedulingPermissionDenied(msg),
            SchedulerError::Failure(msg) => Self::SchedulingFailure(msg),
        }
    }
}

/// Errors reported by an `IlluminationResource`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct IlluminationError(pub String);

impl From<IlluminationError> for WakeError {
    fn from(err: IlluminationError) -> Self {
        Self::IlluminationUnavailable(err.0)
    }
}

/// Errors reported by an `AppLauncher`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LaunchError(pub String);

impl From<LaunchError> for WakeError {
    fn from(err: LaunchError) -> Self {
        Self::LaunchFailed(err.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_errors_map_onto_the_taxonomy() {
        let denied: WakeError = SchedulerError::PermissionDenied("no grant".into()).into();
        assert_eq!(denied, WakeError::SchedulingPermissionDenied("no grant".into()));

        let failed: WakeError = SchedulerError::Failure("binder died".into()).into();
        assert_eq!(failed, WakeError::SchedulingFailure("binder died".into()));
    }

    #[test]
    fn only_missing_config_is_benign() {
        assert!(WakeError::MissingConfig.is_benign());
        assert!(!WakeError::LaunchTargetMissing.is_benign());
        assert!(!WakeError::InvalidConfig { hour: 24, minute: 0 }.is_benign());
    }

    #[test]
    fn unknown_timezone_message_names_both_zones() {
        let err = WakeError::UnknownTimezone {
            tz_id: "Not/AZone".into(),
            fallback: Tz::Asia__Tokyo,
        };
        assert_eq!(err.to_string(), "unknown timezone `Not/AZone`, using Asia/Tokyo");
    }
}
