//! Platform collaborator traits and the data that crosses them.
//!
//! The host's alarm service, power manager and app launcher are wrapped behind
//! the traits in this module. Production builds supply adapters over the real
//! services; the simulator and the tests use `crate::sim::SimulatedPlatform`.

use crate::common::RegistrationKey;
use crate::error::{IlluminationError, LaunchError, SchedulerError};
use crate::store::AlarmConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The wake context copied from the config at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "wake_hour")]
    pub wake_hour: u8,
    #[serde(rename = "wake_min")]
    pub wake_minute: u8,
    #[serde(rename = "tz_id")]
    pub timezone_id: Option<String>,
    #[serde(rename = "tz_offset_min")]
    pub timezone_offset_minutes: i32,
}

impl TriggerEvent {
    /// Copies the wake context out of `config`, naming `resolved_zone` when the
    /// config itself carries no zone.
    pub fn from_config(config: &AlarmConfig, resolved_zone: &str) -> Self {
        Self {
            wake_hour: config.wake_hour,
            wake_minute: config.wake_minute,
            timezone_id: Some(
                config
                    .timezone_id
                    .clone()
                    .unwrap_or_else(|| resolved_zone.to_string()),
            ),
            timezone_offset_minutes: config.timezone_offset_minutes,
        }
    }
}

/// The action the platform delivers back to the wake handler when the alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireAction {
    pub action: String,
    pub event: TriggerEvent,
}

/// An opaque handle to the consumer application's launch entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchTarget(pub String);

/// How the consumer application is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchMode {
    /// Start a new task if not running; otherwise reuse it and clear everything
    /// above it so it comes to the front.
    BringToFront,
}

/// What the platform's alarm indicator opens when the user taps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowAction {
    /// `None` when the launcher could not resolve a target; the indicator is
    /// still shown but opens nothing.
    pub target: Option<LaunchTarget>,
    pub mode: LaunchMode,
}

/// The payload handed to the consumer application on wake.
///
/// Field names are part of the consumer contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPayload {
    pub tap_alarm_wake: bool,
    pub wake_hour: u8,
    pub wake_min: u8,
    pub tz_id: Option<String>,
    pub tz_offset_min: i32,
    /// Epoch milliseconds at which the wake handler ran.
    pub alarm_trigger_time: i64,
}

impl LaunchPayload {
    /// Builds the wake payload from the carried event.
    pub fn for_wake(event: &TriggerEvent, now: DateTime<Utc>) -> Self {
        Self {
            tap_alarm_wake: true,
            wake_hour: event.wake_hour,
            wake_min: event.wake_minute,
            tz_id: event.timezone_id.clone(),
            tz_offset_min: event.timezone_offset_minutes,
            alarm_trigger_time: now.timestamp_millis(),
        }
    }
}

/// The platform's exact-alarm-with-visible-indicator facility.
pub trait ExactAlarmScheduler: Send + Sync {
    /// Registers a one-shot alarm at `trigger_at`, replacing any alarm already
    /// registered under `key`.
    fn register_with_indicator(
        &self,
        trigger_at: DateTime<Utc>,
        fire: FireAction,
        show: ShowAction,
        key: RegistrationKey,
    ) -> Result<(), SchedulerError>;

    /// Cancels the alarm registered under `key`, if any.
    fn cancel(&self, key: RegistrationKey) -> Result<(), SchedulerError>;

    /// Whether the app currently holds the grant for exact alarms.
    fn can_schedule_exact(&self) -> bool;
}

/// A bounded "keep the screen lit" request.
pub trait IlluminationResource: Send + Sync {
    /// Acquires the resource. It releases itself after `max_duration`.
    fn acquire(&self, max_duration: Duration) -> Result<(), IlluminationError>;
}

/// Launches the consumer application.
pub trait AppLauncher: Send + Sync {
    fn resolve_launch_target(&self) -> Option<LaunchTarget>;
    fn launch(
        &self,
        target: &LaunchTarget,
        mode: LaunchMode,
        payload: &LaunchPayload,
    ) -> Result<(), LaunchError>;
}
