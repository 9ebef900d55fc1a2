//! Defines the configuration for the Wakeclock core.
//!
//! These structs are deserialized with `serde`, typically from an optional TOML
//! file layered under `WAKECLOCK_*` environment variables. They describe how the
//! host is wired (which zone counts as the system default, which registration
//! key and action name to use), never the alarm itself, which lives in the
//! persistence store.

use crate::common::{RegistrationKey, DEFAULT_WAKE_ACTION};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for the Wakeclock handlers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeclockConfig {
    /// The zone substituted when the stored zone is absent or unknown, unless
    /// the engine is given a live source of the host's zone.
    /// Uses names from the IANA Time Zone Database (e.g., "Asia/Tokyo").
    pub default_timezone: Tz,

    /// How long the wake handler keeps the screen lit, in milliseconds.
    pub illumination_ms: u64,

    /// The fixed key every registration is made under.
    pub registration_key: RegistrationKey,

    /// The action name carried by the fire action.
    pub wake_action: String,

    /// The time window used to recognise an alarm launch without a wake flag.
    pub wake_window: WakeWindowConfig,
}

/// Bounds around the cached trigger instant, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeWindowConfig {
    /// How early before the trigger a launch still counts as the alarm.
    pub early_ms: i64,
    /// How late after the trigger a launch still counts as the alarm.
    pub late_ms: i64,
    /// Past this age the cached trigger is dropped as stale.
    pub stale_ms: i64,
}

impl WakeclockConfig {
    /// Loads the configuration from an optional TOML file and the environment.
    ///
    /// Missing files are not an error; every field has a default.
    /// Environment variables use the `WAKECLOCK_` prefix, with `__` separating
    /// nested keys (e.g. `WAKECLOCK_WAKE_WINDOW__LATE_MS`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("WAKECLOCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The bounded illumination duration.
    pub fn illumination_duration(&self) -> Duration {
        Duration::from_millis(self.illumination_ms)
    }
}

// --- Default value functions ---

impl Default for WakeclockConfig {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            illumination_ms: 10_000,
            registration_key: RegistrationKey::default(),
            wake_action: DEFAULT_WAKE_ACTION.to_string(),
            wake_window: WakeWindowConfig::default(),
        }
    }
}

impl Default for WakeWindowConfig {
    fn default() -> Self {
        Self {
            early_ms: 30_000,
            late_ms: 120_000,
            stale_ms: 300_000,
        }
    }
}
