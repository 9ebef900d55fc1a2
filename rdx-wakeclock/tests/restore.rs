use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use wakeclock::common::{KEY_NEXT_EPOCH_MS, KEY_TZ_ID, KEY_TZ_OFFSET_MIN, KEY_WAKE_HOUR, KEY_WAKE_MIN};
use wakeclock::components::restorer::ScheduledAlarm;
use wakeclock::prelude::*;
use wakeclock::sim::SimulatedPlatform;

struct Rig {
    store: Arc<MemoryStore>,
    platform: Arc<SimulatedPlatform>,
    restorer: AlarmRestorer,
}

fn rig_with(config: WakeclockConfig, entries: Vec<(&'static str, StoreValue)>) -> Rig {
    let store = Arc::new(MemoryStore::with_entries(entries));
    let platform = Arc::new(SimulatedPlatform::new());
    let restorer = AlarmRestorer::new(&config, store.clone(), platform.clone(), platform.clone());
    Rig {
        store,
        platform,
        restorer,
    }
}

fn rig(hour: i64, minute: i64, tz: Option<&str>) -> Rig {
    let mut entries = vec![
        (KEY_WAKE_HOUR, StoreValue::Int(hour)),
        (KEY_WAKE_MIN, StoreValue::Int(minute)),
    ];
    if let Some(tz) = tz {
        entries.push((KEY_TZ_ID, StoreValue::from(tz)));
    }
    rig_with(WakeclockConfig::default(), entries)
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn scheduled(outcome: RestoreOutcome) -> ScheduledAlarm {
    match outcome {
        RestoreOutcome::Scheduled(alarm) => alarm,
        other => panic!("expected a scheduled alarm, got {other:?}"),
    }
}

#[test]
fn scenario_a_later_today() {
    let rig = rig(7, 30, Some("UTC"));
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 7, 0)));
    assert_eq!(alarm.trigger.utc(), utc(2024, 4, 10, 7, 30));
    assert!(!alarm.trigger.rolled_over);
}

#[test]
fn scenario_b_already_passed_rolls_to_tomorrow() {
    let rig = rig(7, 30, Some("UTC"));
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 8, 0)));
    assert_eq!(alarm.trigger.utc(), utc(2024, 4, 11, 7, 30));
    assert!(alarm.trigger.rolled_over);
}

#[test]
fn scenario_c_unknown_zone_uses_default() {
    let config = WakeclockConfig {
        default_timezone: Tz::Asia__Tokyo,
        ..Default::default()
    };
    let now = utc(2024, 4, 10, 8, 0);

    let unknown = rig_with(
        config.clone(),
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(30)),
            (KEY_TZ_ID, StoreValue::from("Not/AZone")),
        ],
    );
    let absent = rig_with(
        config,
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(30)),
        ],
    );

    let from_unknown = scheduled(unknown.restorer.restore(now));
    let from_absent = scheduled(absent.restorer.restore(now));

    assert!(from_unknown.zone.is_fallback());
    assert_eq!(from_unknown.zone.zone(), Tz::Asia__Tokyo);
    assert_eq!(from_unknown.trigger, from_absent.trigger);
    // The unparseable name is still carried to the consumer as stored.
    assert_eq!(from_unknown.fire.event.timezone_id.as_deref(), Some("Not/AZone"));
    assert_eq!(from_absent.fire.event.timezone_id.as_deref(), Some("Asia/Tokyo"));
}

#[test]
fn scenario_d_no_config_is_a_pure_no_op() {
    let rig = rig_with(WakeclockConfig::default(), vec![]);
    let outcome = rig.restorer.restore(utc(2024, 4, 10, 8, 0));
    assert_eq!(outcome, RestoreOutcome::Skipped(WakeError::MissingConfig));
    assert_eq!(rig.store.writes(), 0);
    assert_eq!(rig.platform.registrations(), 0);
}

#[test]
fn restoring_twice_leaves_one_pending_alarm() {
    let rig = rig(7, 30, Some("UTC"));
    let now = utc(2024, 4, 10, 8, 0);
    let first = scheduled(rig.restorer.restore(now));
    let second = scheduled(rig.restorer.restore(now));

    assert_eq!(first, second);
    assert_eq!(rig.platform.registrations(), 2);
    let pending = rig.platform.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending.get(&RegistrationKey(1001)).map(|a| a.trigger_at),
        Some(utc(2024, 4, 11, 7, 30))
    );
}

#[test]
fn restore_caches_the_trigger() {
    let rig = rig(7, 30, Some("UTC"));
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 8, 0)));
    assert!(alarm.cache_written);
    assert_eq!(
        rig.store.get(KEY_NEXT_EPOCH_MS),
        Some(StoreValue::Int(utc(2024, 4, 11, 7, 30).timestamp_millis()))
    );
}

#[test]
fn fire_action_copies_the_config() {
    let rig = rig_with(
        WakeclockConfig::default(),
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(5)),
            (KEY_WAKE_MIN, StoreValue::Int(55)),
            (KEY_TZ_ID, StoreValue::from("America/Sao_Paulo")),
            (KEY_TZ_OFFSET_MIN, StoreValue::Int(-180)),
        ],
    );
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 8, 0)));
    assert_eq!(
        alarm.fire.event,
        TriggerEvent {
            wake_hour: 5,
            wake_minute: 55,
            timezone_id: Some("America/Sao_Paulo".into()),
            timezone_offset_minutes: -180,
        }
    );
}

#[test]
fn permission_denied_is_reported_not_raised() {
    let rig = rig(7, 30, Some("UTC"));
    rig.platform.allow_exact_alarms(false);
    let outcome = rig.restorer.restore(utc(2024, 4, 10, 8, 0));
    match outcome {
        RestoreOutcome::Failed { error, trigger } => {
            assert!(matches!(error, WakeError::SchedulingPermissionDenied(_)));
            assert_eq!(trigger.utc(), utc(2024, 4, 11, 7, 30));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(rig.platform.pending().is_empty());
    assert_eq!(rig.store.writes(), 0);
}

#[test]
fn registration_failure_is_reported_not_raised() {
    let rig = rig(7, 30, Some("UTC"));
    rig.platform.fail_registrations(Some("alarm service unavailable"));
    let outcome = rig.restorer.restore(utc(2024, 4, 10, 8, 0));
    assert!(matches!(
        outcome,
        RestoreOutcome::Failed {
            error: WakeError::SchedulingFailure(_),
            ..
        }
    ));
    assert_eq!(rig.store.writes(), 0);
}

#[test]
fn every_restore_signal_restores_and_others_do_not() {
    for signal in [
        HostEvent::BootCompleted,
        HostEvent::LockedBootCompleted,
        HostEvent::TimeChanged,
        HostEvent::TimezoneChanged,
    ] {
        let rig = rig(7, 30, Some("UTC"));
        let outcome = rig.restorer.on_event(&signal, utc(2024, 4, 10, 8, 0));
        assert!(matches!(outcome, RestoreOutcome::Scheduled(_)), "{signal}");
    }

    let rig = rig(7, 30, Some("UTC"));
    let outcome = rig
        .restorer
        .on_event(&HostEvent::from_action("android.intent.action.USER_PRESENT"), utc(2024, 4, 10, 8, 0));
    assert!(matches!(outcome, RestoreOutcome::Ignored(_)));
    assert_eq!(rig.platform.registrations(), 0);
}

#[test]
fn timezone_change_recomputes_in_the_stored_zone() {
    // The stored zone wins over the default, whatever the system zone becomes.
    let config = WakeclockConfig {
        default_timezone: Tz::America__Los_Angeles,
        ..Default::default()
    };
    let rig = rig_with(
        config,
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(0)),
            (KEY_TZ_ID, StoreValue::from("Europe/London")),
        ],
    );
    let alarm = scheduled(
        rig.restorer
            .on_event(&HostEvent::TimezoneChanged, utc(2024, 1, 10, 12, 0)),
    );
    assert_eq!(alarm.trigger.utc(), utc(2024, 1, 11, 7, 0));
}

#[test]
fn numeric_zone_falls_back_and_still_schedules() {
    let rig = rig_with(
        WakeclockConfig::default(),
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(30)),
            (KEY_TZ_ID, StoreValue::Int(9)),
        ],
    );
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 8, 0)));
    assert!(alarm.zone.is_fallback());
    assert_eq!(alarm.trigger.utc(), utc(2024, 4, 11, 7, 30));
    assert_eq!(rig.platform.registrations(), 1);
}

#[test]
fn malformed_offset_is_forwarded_as_zero() {
    let rig = rig_with(
        WakeclockConfig::default(),
        vec![
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(30)),
            (KEY_TZ_ID, StoreValue::from("Asia/Tokyo")),
            (KEY_TZ_OFFSET_MIN, StoreValue::from("+09:00")),
        ],
    );
    let alarm = scheduled(rig.restorer.restore(utc(2024, 4, 10, 8, 0)));
    assert_eq!(alarm.fire.event.timezone_offset_minutes, 0);
    assert_eq!(alarm.fire.event.timezone_id.as_deref(), Some("Asia/Tokyo"));
    assert_eq!(rig.platform.pending().len(), 1);
}

#[test]
fn timezone_change_without_stored_zone_follows_the_host() {
    let host_zone = Arc::new(Mutex::new(Tz::UTC));
    let store = Arc::new(MemoryStore::with_entries(vec![
        (KEY_WAKE_HOUR, StoreValue::Int(7)),
        (KEY_WAKE_MIN, StoreValue::Int(0)),
    ]));
    let platform = Arc::new(SimulatedPlatform::new());
    let source = host_zone.clone();
    let restorer = AlarmRestorer::new(
        &WakeclockConfig::default(),
        store,
        platform.clone(),
        platform.clone(),
    )
    .with_system_zone(Arc::new(move || *source.lock()));
    let now = utc(2024, 4, 10, 12, 0);

    let before = scheduled(restorer.on_event(&HostEvent::BootCompleted, now));
    assert_eq!(before.trigger.utc(), utc(2024, 4, 11, 7, 0));

    *host_zone.lock() = Tz::Asia__Tokyo;
    let after = scheduled(restorer.on_event(&HostEvent::TimezoneChanged, now));
    // 07:00 JST on the 11th.
    assert_eq!(after.trigger.utc(), utc(2024, 4, 10, 22, 0));
    assert_eq!(after.zone, wakeclock::time::ZoneResolution::Default(Tz::Asia__Tokyo));
    assert_eq!(after.fire.event.timezone_id.as_deref(), Some("Asia/Tokyo"));
    assert_eq!(platform.pending().len(), 1);
}

proptest! {
    #[test]
    fn rollover_law(
        hour in 0u8..24,
        minute in 0u8..60,
        offset_secs in 0i64..(400 * 24 * 3600),
    ) {
        let now = utc(2024, 1, 1, 0, 0) + Duration::seconds(offset_secs);
        let rig = rig(i64::from(hour), i64::from(minute), Some("UTC"));
        let alarm = scheduled(rig.restorer.restore(now));

        let today = now.date_naive().and_hms_opt(u32::from(hour), u32::from(minute), 0).unwrap().and_utc();
        if today <= now {
            prop_assert_eq!(alarm.trigger.utc(), today + Duration::days(1));
            prop_assert!(alarm.trigger.rolled_over);
        } else {
            prop_assert_eq!(alarm.trigger.utc(), today);
            prop_assert!(!alarm.trigger.rolled_over);
        }
        prop_assert!(alarm.trigger.utc() > now);
    }

    #[test]
    fn validation_law(
        hour in prop_oneof![-1000i64..0, 24i64..1000, 0i64..24],
        minute in prop_oneof![-1000i64..0, 60i64..1000, 0i64..60],
    ) {
        prop_assume!(!(0..24).contains(&hour) || !(0..60).contains(&minute));
        let rig = rig(hour, minute, Some("UTC"));
        let outcome = rig.restorer.restore(utc(2024, 4, 10, 8, 0));
        prop_assert_eq!(outcome, RestoreOutcome::Skipped(WakeError::InvalidConfig { hour, minute }));
        prop_assert_eq!(rig.platform.registrations(), 0);
        prop_assert_eq!(rig.store.writes(), 0);
    }

    #[test]
    fn trigger_is_always_in_the_future_in_any_zone(
        hour in 0u8..24,
        minute in 0u8..60,
        offset_secs in 0i64..(400 * 24 * 3600),
        zone in prop::sample::select(vec![
            "America/New_York", "Europe/Berlin", "Australia/Lord_Howe", "Asia/Kolkata", "Pacific/Chatham",
        ]),
    ) {
        let now = utc(2024, 1, 1, 0, 0) + Duration::seconds(offset_secs);
        let rig = rig(i64::from(hour), i64::from(minute), Some(zone));
        let alarm = scheduled(rig.restorer.restore(now));
        prop_assert!(alarm.trigger.utc() > now);
        prop_assert!(alarm.trigger.utc() - now <= Duration::hours(26));
    }
}
