//! Handles the alarm firing: light the screen, launch the consumer.

use crate::config::WakeclockConfig;
use crate::error::WakeError;
use crate::platform::{AppLauncher, FireAction, IlluminationResource, LaunchMode, LaunchPayload};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What a wake run did. Consumed only for logging and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// The action was not the wake action.
    Ignored { action: String },
    /// The consumer was launched.
    Launched {
        payload: LaunchPayload,
        /// `None` if the screen was lit, otherwise why it was not.
        illumination: Option<WakeError>,
    },
    /// Nothing was launched.
    Aborted {
        error: WakeError,
        illumination: Option<WakeError>,
    },
}

#[derive(Clone)]
pub struct WakeHandler {
    illumination: Arc<dyn IlluminationResource>,
    launcher: Arc<dyn AppLauncher>,
    illumination_duration: Duration,
    wake_action: String,
}

impl WakeHandler {
    pub fn new(
        config: &WakeclockConfig,
        illumination: Arc<dyn IlluminationResource>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        Self {
            illumination,
            launcher,
            illumination_duration: config.illumination_duration(),
            wake_action: config.wake_action.clone(),
        }
    }

    /// Handles a fired action at `now`.
    pub fn handle(&self, fire: &FireAction, now: DateTime<Utc>) -> WakeOutcome {
        info!(action = %fire.action, epoch_ms = now.timestamp_millis(), "Alarm received.");
        if fire.action != self.wake_action {
            warn!(action = %fire.action, "Unknown action.");
            return WakeOutcome::Ignored {
                action: fire.action.clone(),
            };
        }

        let illumination = match self.illumination.acquire(self.illumination_duration) {
            Ok(()) => {
                info!(duration = ?self.illumination_duration, "Illumination acquired.");
                None
            }
            Err(err) => {
                let err = WakeError::from(err);
                error!(error = %err, "Proceeding without illumination.");
                Some(err)
            }
        };

        let Some(target) = self.launcher.resolve_launch_target() else {
            error!("No launch target for the consumer application.");
            return WakeOutcome::Aborted {
                error: WakeError::LaunchTargetMissing,
                illumination,
            };
        };

        let payload = LaunchPayload::for_wake(&fire.event, now);
        info!(
            wake_hour = payload.wake_hour,
            wake_min = payload.wake_min,
            tz_id = ?payload.tz_id,
            tz_offset_min = payload.tz_offset_min,
            alarm_trigger_time = payload.alarm_trigger_time,
            "Launching consumer with alarm data."
        );

        match self.launcher.launch(&target, LaunchMode::BringToFront, &payload) {
            Ok(()) => {
                info!(target = %target.0, "App launch triggered.");
                WakeOutcome::Launched {
                    payload,
                    illumination,
                }
            }
            Err(err) => {
                let err = WakeError::from(err);
                error!(error = %err, target = %target.0, "Failed to launch consumer.");
                WakeOutcome::Aborted {
                    error: err,
                    illumination,
                }
            }
        }
    }
}
