//! Re-arms the daily wake alarm after boot or a clock/zone change.

use crate::common::{HostEvent, RegistrationKey, KEY_NEXT_EPOCH_MS};
use crate::components::arm;
use crate::config::WakeclockConfig;
use crate::error::WakeError;
use crate::platform::{AppLauncher, ExactAlarmScheduler, FireAction, TriggerEvent};
use crate::store::{AlarmConfig, PersistenceStore};
use crate::time::{fixed_zone, next_trigger, resolve_zone, NextTrigger, ZoneResolution, ZoneSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a restore run did. Consumed only for logging and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The host signal does not trigger a restore.
    Ignored(HostEvent),
    /// Nothing valid to restore (`MissingConfig`, `InvalidConfig`, `InvalidValue`).
    Skipped(WakeError),
    /// The alarm was computed but the platform refused to register it.
    Failed {
        trigger: NextTrigger,
        error: WakeError,
    },
    /// The alarm is registered.
    Scheduled(ScheduledAlarm),
}

/// A successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAlarm {
    pub trigger: NextTrigger,
    pub zone: ZoneResolution,
    pub fire: FireAction,
    /// `false` if the `next_epoch_ms` cache could not be written.
    pub cache_written: bool,
}

/// Reads the persisted alarm, computes its next trigger and re-registers it.
///
/// Holds no state of its own between runs; everything it needs is read from the
/// store on each call.
#[derive(Clone)]
pub struct AlarmRestorer {
    store: Arc<dyn PersistenceStore>,
    scheduler: Arc<dyn ExactAlarmScheduler>,
    launcher: Arc<dyn AppLauncher>,
    system_zone: ZoneSource,
    registration_key: RegistrationKey,
    wake_action: String,
}

impl AlarmRestorer {
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
            system_zone: fixed_zone(config.default_timezone),
            registration_key: config.registration_key,
            wake_action: config.wake_action.clone(),
        }
    }

    /// Reads the host's default zone from `source` instead of the configured
    /// `default_timezone`.
    pub fn with_system_zone(mut self, source: ZoneSource) -> Self {
        self.system_zone = source;
        self
    }

    /// Handles a host signal. Only boot and clock/zone change signals restore.
    pub fn on_event(&self, event: &HostEvent, now: DateTime<Utc>) -> RestoreOutcome {
        if !event.triggers_restore() {
            warn!(action = %event, "Ignoring action.");
            return RestoreOutcome::Ignored(event.clone());
        }
        info!(action = %event, "Restoring wake alarm.");
        self.restore(now)
    }

    /// Restores the alarm as of `now`.
    ///
    /// Idempotent: every run registers under the same key, so any number of runs
    /// with the same config leaves exactly one pending alarm.
    pub fn restore(&self, now: DateTime<Utc>) -> RestoreOutcome {
        let config = match AlarmConfig::load(self.store.as_ref()) {
            Ok(config) => config,
            Err(WakeError::MissingConfig) => {
                warn!("No alarm data found in store.");
                return RestoreOutcome::Skipped(WakeError::MissingConfig);
            }
            Err(err) => {
                error!(error = %err, "Stored alarm is invalid; not restoring.");
                return RestoreOutcome::Skipped(err);
            }
        };

        let zone = resolve_zone(config.timezone_id.as_deref(), (self.system_zone)());
        if let ZoneResolution::Fallback { tz_id, zone } = &zone {
            let err = WakeError::UnknownTimezone {
                tz_id: tz_id.clone(),
                fallback: *zone,
            };
            warn!(error = %err, "Falling back to the default zone.");
        }
        info!(
            hour = config.wake_hour,
            minute = config.wake_minute,
            zone = %zone.zone(),
            "Restoring alarm {:02}:{:02}.",
            config.wake_hour,
            config.wake_minute
        );

        let trigger = next_trigger(config.wake_hour, config.wake_minute, zone.zone(), now);
        if trigger.rolled_over {
            debug!("Alarm time is in the past, scheduling for tomorrow.");
        }
        info!(next = %trigger.at, epoch_ms = trigger.epoch_ms(), "Next alarm computed.");

        let event = TriggerEvent::from_config(&config, zone.zone().name());
        let fire = match arm(
            self.scheduler.as_ref(),
            self.launcher.as_ref(),
            self.registration_key,
            &self.wake_action,
            trigger.utc(),
            event,
        ) {
            Ok(fire) => fire,
            Err(err) => {
                match &err {
                    WakeError::SchedulingPermissionDenied(_) => {
                        error!(error = %err, next = %trigger.at, "Missing exact alarm permission.")
                    }
                    _ => error!(error = %err, next = %trigger.at, "Failed to set alarm."),
                }
                return RestoreOutcome::Failed {
                    trigger,
                    error: err,
                };
            }
        };

        let cache_written = match self
            .store
            .set(KEY_NEXT_EPOCH_MS, trigger.epoch_ms().into())
        {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Could not cache next trigger.");
                false
            }
        };

        info!(next = %trigger.at, key = %self.registration_key, "Alarm restored successfully.");
        RestoreOutcome::Scheduled(ScheduledAlarm {
            trigger,
            zone,
            fire,
            cache_written,
        })
    }
}
