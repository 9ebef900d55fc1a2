//! Contains common, primitive types shared across the Wakeclock crate.
//!
//! This module defines the identifiers used to talk to the platform (the
//! registration key, the persisted key names) and the host signals that the
//! restorer reacts to. Using distinct types keeps the host's stringly-typed
//! surface at the edges of the crate.

use serde::Deserialize;
use std::fmt;

/// Persisted key for the wake hour (`0..=23`).
pub const KEY_WAKE_HOUR: &str = "wake_hour";
/// Persisted key for the wake minute (`0..=59`).
pub const KEY_WAKE_MIN: &str = "wake_min";
/// Persisted key for the IANA zone name.
pub const KEY_TZ_ID: &str = "tz_id";
/// Persisted key for the informational UTC offset in minutes.
pub const KEY_TZ_OFFSET_MIN: &str = "tz_offset_min";
/// Persisted key for the cached next trigger instant, in epoch milliseconds.
pub const KEY_NEXT_EPOCH_MS: &str = "next_epoch_ms";

/// The action name carried by the fire action unless configured otherwise.
pub const DEFAULT_WAKE_ACTION: &str = "wakeclock.action.ALARM_WAKE";

/// Identifies a registration with the platform scheduler.
///
/// Registering twice under the same key replaces the earlier registration
/// instead of adding a second pending alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct RegistrationKey(pub u32);

impl Default for RegistrationKey {
    fn default() -> Self {
        Self(1001)
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A signal delivered by the host OS event system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The device finished booting.
    BootCompleted,
    /// The device finished booting but user storage is still locked.
    LockedBootCompleted,
    /// The wall clock was set.
    TimeChanged,
    /// The system time zone changed.
    TimezoneChanged,
    /// Any other action. Delivered here by broad receivers and always ignored.
    Other(String),
}

impl HostEvent {
    /// Maps a host action string onto a `HostEvent`.
    ///
    /// Both the Android broadcast action names and short shell aliases are
    /// accepted.
    pub fn from_action(action: &str) -> Self {
        match action {
            "android.intent.action.BOOT_COMPLETED" | "boot" => Self::BootCompleted,
            "android.intent.action.LOCKED_BOOT_COMPLETED" | "locked-boot" => {
                Self::LockedBootCompleted
            }
            "android.intent.action.TIME_SET" | "time-set" => Self::TimeChanged,
            "android.intent.action.TIMEZONE_CHANGED" | "timezone-changed" => {
                Self::TimezoneChanged
            }
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns `true` if this signal should trigger an alarm restore.
    pub fn triggers_restore(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootCompleted => f.write_str("BOOT_COMPLETED"),
            Self::LockedBootCompleted => f.write_str("LOCKED_BOOT_COMPLETED"),
            Self::TimeChanged => f.write_str("TIME_SET"),
            Self::TimezoneChanged => f.write_str("TIMEZONE_CHANGED"),
            Self::Other(action) => f.write_str(action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_actions_map_to_restore_triggers() {
        for action in [
            "android.intent.action.BOOT_COMPLETED",
            "android.intent.action.LOCKED_BOOT_COMPLETED",
            "android.intent.action.TIME_SET",
            "android.intent.action.TIMEZONE_CHANGED",
        ] {
            assert!(HostEvent::from_action(action).triggers_restore(), "{action}");
        }
    }

    #[test]
    fn unknown_action_is_other() {
        let event = HostEvent::from_action("android.intent.action.SCREEN_ON");
        assert_eq!(
            event,
            HostEvent::Other("android.intent.action.SCREEN_ON".to_string())
        );
        assert!(!event.triggers_restore());
    }
}
