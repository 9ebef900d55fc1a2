//! Contains the handlers that make up the Wakeclock core.
//!
//! This module provides the two host-dispatched handlers (the restorer and the
//! wake handler) and the consumer-side client. The `WakeclockEngine` owns one of
//! each and routes host signals to them.

pub mod client;
pub mod restorer;
pub mod wake;

use crate::common::RegistrationKey;
use crate::error::WakeError;
use crate::platform::{
    AppLauncher, ExactAlarmScheduler, FireAction, LaunchMode, ShowAction, TriggerEvent,
};
use chrono::{DateTime, Utc};

/// Registers `event` to fire at `trigger_at` under `key`.
///
/// Shared by the restorer and the client so both produce the same fire and show
/// actions.
pub(crate) fn arm(
    scheduler: &dyn ExactAlarmScheduler,
    launcher: &dyn AppLauncher,
    key: RegistrationKey,
    wake_action: &str,
    trigger_at: DateTime<Utc>,
    event: TriggerEvent,
) -> Result<FireAction, WakeError> {
    let fire = FireAction {
        action: wake_action.to_string(),
        event,
    };
    let show = ShowAction {
        target: launcher.resolve_launch_target(),
        mode: LaunchMode::BringToFront,
    };
    scheduler.register_with_indicator(trigger_at, fire.clone(), show, key)?;
    Ok(fire)
}
