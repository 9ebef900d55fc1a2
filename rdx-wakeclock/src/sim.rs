//! An in-process stand-in for the host platform.
//!
//! `SimulatedPlatform` implements the scheduler, illumination and launcher
//! traits at once. It keeps a pending-alarm table keyed by registration key,
//! records every illumination request and launch, and can be told to fail each
//! call so the handlers' containment paths can be exercised. The shell and the
//! `wakedev` demo drive the engine against it; the tests use it as a fake.

use crate::common::RegistrationKey;
use crate::error::{IlluminationError, LaunchError, SchedulerError};
use crate::platform::{
    AppLauncher, ExactAlarmScheduler, FireAction, IlluminationResource, LaunchMode,
    LaunchPayload, LaunchTarget, ShowAction,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// The launch target the simulator resolves unless told otherwise.
pub const DEFAULT_LAUNCH_TARGET: &str = "rdx.wakeclock/.WakeActivity";

/// An alarm waiting in the simulated scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAlarm {
    pub trigger_at: DateTime<Utc>,
    pub fire: FireAction,
    pub show: ShowAction,
}

/// A launch the simulated launcher accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub target: LaunchTarget,
    pub mode: LaunchMode,
    pub payload: LaunchPayload,
}

/// Simulated scheduler, power manager and app launcher.
#[derive(Debug)]
pub struct SimulatedPlatform {
    pending: Mutex<BTreeMap<RegistrationKey, PendingAlarm>>,
    registrations: AtomicUsize,
    exact_allowed: AtomicBool,
    registration_failure: Mutex<Option<String>>,
    illumination_failure: Mutex<Option<String>>,
    illuminations: Mutex<Vec<Duration>>,
    launch_target: Mutex<Option<LaunchTarget>>,
    launch_failure: Mutex<Option<String>>,
    launches: Mutex<Vec<LaunchRecord>>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            registrations: AtomicUsize::new(0),
            exact_allowed: AtomicBool::new(true),
            registration_failure: Mutex::new(None),
            illumination_failure: Mutex::new(None),
            illuminations: Mutex::new(Vec::new()),
            launch_target: Mutex::new(Some(LaunchTarget(DEFAULT_LAUNCH_TARGET.to_string()))),
            launch_failure: Mutex::new(None),
            launches: Mutex::new(Vec::new()),
        }
    }

    // --- Failure switches ---

    /// Grants or revokes the exact-alarm permission.
    pub fn allow_exact_alarms(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::Relaxed);
    }

    /// Makes registrations fail with `reason`, or succeed again with `None`.
    pub fn fail_registrations(&self, reason: Option<&str>) {
        *self.registration_failure.lock() = reason.map(str::to_string);
    }

    /// Makes illumination requests fail with `reason`, or succeed again with `None`.
    pub fn fail_illumination(&self, reason: Option<&str>) {
        *self.illumination_failure.lock() = reason.map(str::to_string);
    }

    /// Sets what `resolve_launch_target` returns.
    pub fn set_launch_target(&self, target: Option<LaunchTarget>) {
        *self.launch_target.lock() = target;
    }

    /// Makes launches fail with `reason`, or succeed again with `None`.
    pub fn fail_launches(&self, reason: Option<&str>) {
        *self.launch_failure.lock() = reason.map(str::to_string);
    }

    // --- Inspection ---

    /// The alarms currently waiting, by key.
    pub fn pending(&self) -> BTreeMap<RegistrationKey, PendingAlarm> {
        self.pending.lock().clone()
    }

    /// The number of accepted `register_with_indicator` calls.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Every duration illumination was successfully acquired for.
    pub fn illuminations(&self) -> Vec<Duration> {
        self.illuminations.lock().clone()
    }

    /// Every accepted launch, oldest first.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }

    /// Removes and returns the fire actions of every alarm due at `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<FireAction> {
        let mut pending = self.pending.lock();
        let due: Vec<RegistrationKey> = pending
            .iter()
            .filter(|(_, alarm)| alarm.trigger_at <= now)
            .map(|(key, _)| *key)
            .collect();
        due.into_iter()
            .filter_map(|key| pending.remove(&key))
            .map(|alarm| alarm.fire)
            .collect()
    }

    /// Drops every pending alarm, as a device restart does.
    pub fn reboot(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock());
        info!(dropped = dropped.len(), "Simulated reboot.");
    }

    /// The earliest pending trigger instant, if any.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.lock().values().map(|a| a.trigger_at).min()
    }
}

impl ExactAlarmScheduler for SimulatedPlatform {
    fn register_with_indicator(
        &self,
        trigger_at: DateTime<Utc>,
        fire: FireAction,
        show: ShowAction,
        key: RegistrationKey,
    ) -> Result<(), SchedulerError> {
        if !self.can_schedule_exact() {
            return Err(SchedulerError::PermissionDenied(
                "exact alarm grant revoked".to_string(),
            ));
        }
        if let Some(reason) = self.registration_failure.lock().clone() {
            return Err(SchedulerError::Failure(reason));
        }
        let replaced = self.pending.lock().insert(
            key,
            PendingAlarm {
                trigger_at,
                fire,
                show,
            },
        );
        self.registrations.fetch_add(1, Ordering::Relaxed);
        debug!(%key, %trigger_at, replaced = replaced.is_some(), "Simulated alarm registered.");
        Ok(())
    }

    fn cancel(&self, key: RegistrationKey) -> Result<(), SchedulerError> {
        let removed = self.pending.lock().remove(&key);
        debug!(%key, removed = removed.is_some(), "Simulated alarm cancelled.");
        Ok(())
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::Relaxed)
    }
}

impl IlluminationResource for SimulatedPlatform {
    fn acquire(&self, max_duration: Duration) -> Result<(), IlluminationError> {
        if let Some(reason) = self.illumination_failure.lock().clone() {
            return Err(IlluminationError(reason));
        }
        self.illuminations.lock().push(max_duration);
        Ok(())
    }
}

impl AppLauncher for SimulatedPlatform {
    fn resolve_launch_target(&self) -> Option<LaunchTarget> {
        self.launch_target.lock().clone()
    }

    fn launch(
        &self,
        target: &LaunchTarget,
        mode: LaunchMode,
        payload: &LaunchPayload,
    ) -> Result<(), LaunchError> {
        if let Some(reason) = self.launch_failure.lock().clone() {
            return Err(LaunchError(reason));
        }
        info!(target = %target.0, ?mode, "Simulated launch.");
        self.launches.lock().push(LaunchRecord {
            target: target.clone(),
            mode,
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TriggerEvent;
    use chrono::TimeZone;

    fn fire() -> FireAction {
        FireAction {
            action: "wake".into(),
            event: TriggerEvent {
                wake_hour: 7,
                wake_minute: 0,
                timezone_id: None,
                timezone_offset_minutes: 0,
            },
        }
    }

    fn show() -> ShowAction {
        ShowAction {
            target: None,
            mode: LaunchMode::BringToFront,
        }
    }

    #[test]
    fn same_key_replaces() {
        let sim = SimulatedPlatform::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap();
        sim.register_with_indicator(t1, fire(), show(), RegistrationKey(1)).unwrap();
        sim.register_with_indicator(t2, fire(), show(), RegistrationKey(1)).unwrap();
        assert_eq!(sim.pending().len(), 1);
        assert_eq!(sim.next_due(), Some(t2));
        assert_eq!(sim.registrations(), 2);
    }

    #[test]
    fn take_due_only_returns_elapsed_alarms() {
        let sim = SimulatedPlatform::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
        sim.register_with_indicator(t, fire(), show(), RegistrationKey(1)).unwrap();
        assert!(sim.take_due(t - chrono::Duration::seconds(1)).is_empty());
        assert_eq!(sim.take_due(t), vec![fire()]);
        assert!(sim.pending().is_empty());
    }

    #[test]
    fn revoked_grant_denies_registration() {
        let sim = SimulatedPlatform::new();
        sim.allow_exact_alarms(false);
        let err = sim
            .register_with_indicator(Utc::now(), fire(), show(), RegistrationKey(1))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PermissionDenied(_)));
        assert_eq!(sim.registrations(), 0);
    }
}
