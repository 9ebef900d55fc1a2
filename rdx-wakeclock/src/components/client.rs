//! The consumer application's side of the alarm.
//!
//! The consumer writes the config the restorer reads, arms the first alarm
//! (and each following day's), and on startup decides whether it was launched
//! by the alarm.

use crate::common::{RegistrationKey, KEY_NEXT_EPOCH_MS};
use crate::components::arm;
use crate::config::{WakeWindowConfig, WakeclockConfig};
use crate::error::WakeError;
use crate::platform::{AppLauncher, ExactAlarmScheduler, LaunchPayload, TriggerEvent};
use crate::store::{AlarmConfig, PersistenceStore};
use crate::time::{from_epoch_ms, localize, offset_minutes};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An alarm armed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedAlarm {
    pub at: DateTime<Tz>,
    pub event: TriggerEvent,
    /// `true` if the requested time was not in the future and the alarm was
    /// moved to one minute from now.
    pub moved_to_soon: bool,
    /// `false` if the config could not be persisted. The alarm is still armed,
    /// but a later restore will read whatever the store holds.
    pub config_saved: bool,
}

#[derive(Clone)]
pub struct AlarmClient {
    store: Arc<dyn PersistenceStore>,
    scheduler: Arc<dyn ExactAlarmScheduler>,
    launcher: Arc<dyn AppLauncher>,
    registration_key: RegistrationKey,
    wake_action: String,
    window: WakeWindowConfig,
}

impl AlarmClient {
    pub fn new(
        config: &WakeclockConfig,
        store: Arc<dyn PersistenceStore>,
        scheduler: Arc<dyn ExactAlarmScheduler>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        Self {
            store,
            scheduler,
            launcher,
            registration_key: config.registration_key,
            wake_action: config.wake_action.clone(),
            window: config.wake_window.clone(),
        }
    }

    /// Whether exact alarms may currently be scheduled.
    pub fn check_permission(&self) -> bool {
        let allowed = self.scheduler.can_schedule_exact();
        debug!(allowed, "Exact alarm permission checked.");
        allowed
    }

    /// Arms the alarm for `target_local` in `zone` and persists its config.
    ///
    /// A target that is not after `now` is moved to one minute from now.
    /// Nothing is written or registered when the permission is missing.
    pub fn schedule(
        &self,
        target_local: NaiveDateTime,
        zone: Tz,
        now: DateTime<Utc>,
    ) -> Result<ArmedAlarm, WakeError> {
        let mut at = localize(zone, target_local);
        let moved_to_soon = at.with_timezone(&Utc) <= now;
        if moved_to_soon {
            at = (now + Duration::minutes(1)).with_timezone(&zone);
            warn!(requested = %target_local, fallback = %at, "Past time specified, using +1min.");
        }

        if !self.check_permission() {
            let err = WakeError::SchedulingPermissionDenied(
                "exact alarm permission not granted".to_string(),
            );
            error!(error = %err, "Not scheduling.");
            return Err(err);
        }

        let trigger_at = at.with_timezone(&Utc);
        let event = TriggerEvent {
            wake_hour: at.hour() as u8,
            wake_minute: at.minute() as u8,
            timezone_id: Some(zone.name().to_string()),
            timezone_offset_minutes: offset_minutes(zone, trigger_at),
        };

        if let Err(err) = self.scheduler.cancel(self.registration_key) {
            warn!(error = %err, "Cancel failed (may not exist).");
        }
        arm(
            self.scheduler.as_ref(),
            self.launcher.as_ref(),
            self.registration_key,
            &self.wake_action,
            trigger_at,
            event.clone(),
        )?;

        let config_saved = match (AlarmConfig {
            wake_hour: event.wake_hour,
            wake_minute: event.wake_minute,
            timezone_id: event.timezone_id.clone(),
            timezone_offset_minutes: event.timezone_offset_minutes,
            next_trigger_epoch_ms: Some(trigger_at.timestamp_millis()),
        })
        .save(self.store.as_ref())
        {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "Alarm armed but its config was not saved.");
                false
            }
        };

        info!(next = %at, zone = %zone, "Wake alarm scheduled.");
        Ok(ArmedAlarm {
            at,
            event,
            moved_to_soon,
            config_saved,
        })
    }

    /// Cancels the pending alarm and drops the cached trigger.
    ///
    /// The config keys stay in place, so a later restore still has them.
    pub fn cancel(&self) -> Result<(), WakeError> {
        self.scheduler.cancel(self.registration_key)?;
        self.store.remove(KEY_NEXT_EPOCH_MS)?;
        info!(key = %self.registration_key, "Wake alarm canceled.");
        Ok(())
    }

    /// The cached next trigger, rendered in `zone`.
    pub fn next_wake_local(&self, zone: Tz) -> Option<DateTime<Tz>> {
        let next = self
            .store
            .get(KEY_NEXT_EPOCH_MS)
            .and_then(|v| v.as_int())
            .and_then(from_epoch_ms)
            .map(|at| at.with_timezone(&zone));
        if next.is_none() {
            warn!("No saved wake time.");
        }
        next
    }

    /// Decides whether the current launch was caused by the alarm.
    ///
    /// A launch payload carrying the wake flag is authoritative. Without one,
    /// the launch counts as the alarm if `now` is within the configured window
    /// around the cached trigger; a matched or long-stale cache entry is cleared.
    pub fn should_auto_wake(&self, payload: Option<&LaunchPayload>, now: DateTime<Utc>) -> bool {
        if let Some(payload) = payload.filter(|p| p.tap_alarm_wake) {
            info!(
                alarm_trigger_time = payload.alarm_trigger_time,
                "Alarm detected from launch payload."
            );
            return true;
        }

        let Some(epoch_ms) = self.store.get(KEY_NEXT_EPOCH_MS).and_then(|v| v.as_int()) else {
            warn!("No saved epoch time.");
            return false;
        };
        let Some(diff) = now.timestamp_millis().checked_sub(epoch_ms) else {
            warn!(epoch_ms, "Saved epoch time is unusable, clearing cache.");
            self.clear_cached_trigger();
            return false;
        };
        debug!(epoch_ms, diff, "Time window check.");

        if (-self.window.early_ms..=self.window.late_ms).contains(&diff) {
            info!(diff, "Time window matched.");
            self.clear_cached_trigger();
            return true;
        }
        if diff > self.window.stale_ms {
            warn!(diff, "Alarm time passed long ago, clearing cache.");
            self.clear_cached_trigger();
        } else {
            debug!(diff, "Outside time window.");
        }
        false
    }

    fn clear_cached_trigger(&self) {
        if let Err(err) = self.store.remove(KEY_NEXT_EPOCH_MS) {
            warn!(error = %err, "Could not clear cached trigger.");
        }
    }
}
