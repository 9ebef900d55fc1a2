//! Zone resolution and next-trigger computation.
//!
//! This is the only place where wall-clock reasoning happens. Everything here
//! is a pure function of its arguments so it can be tested without a platform.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use std::sync::Arc;

/// A source of the host's current default zone, read on every restore.
pub type ZoneSource = Arc<dyn Fn() -> Tz + Send + Sync>;

/// A `ZoneSource` that always reports `zone`.
pub fn fixed_zone(zone: Tz) -> ZoneSource {
    Arc::new(move || zone)
}

/// How a stored zone name was turned into a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneResolution {
    /// The stored name resolved.
    Named(Tz),
    /// No name was stored; the system default was used.
    Default(Tz),
    /// The stored name did not resolve; the system default was used.
    Fallback { tz_id: String, zone: Tz },
}

impl ZoneResolution {
    /// The zone to compute in.
    pub fn zone(&self) -> Tz {
        match self {
            Self::Named(zone) | Self::Default(zone) => *zone,
            Self::Fallback { zone, .. } => *zone,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Resolves an optional IANA zone name, substituting `default` when the name is
/// absent or unknown.
pub fn resolve_zone(tz_id: Option<&str>, default: Tz) -> ZoneResolution {
    match tz_id {
        None => ZoneResolution::Default(default),
        Some(id) => match id.parse::<Tz>() {
            Ok(zone) => ZoneResolution::Named(zone),
            Err(_) => ZoneResolution::Fallback {
                tz_id: id.to_string(),
                zone: default,
            },
        },
    }
}

/// Pins a local wall-clock time to an instant in `zone`.
///
/// An ambiguous local time (clocks going back) resolves to the earlier instant.
/// A local time inside a gap (clocks going forward) is pushed forward by the
/// length of the gap, so 02:30 in a one-hour gap becomes 03:30.
pub fn localize(zone: Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(at) => at,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = zone.offset_from_utc_datetime(&(local - Duration::days(1)));
            let shift = Duration::seconds(i64::from(before.fix().local_minus_utc()));
            zone.from_utc_datetime(&(local - shift))
        }
    }
}

/// The outcome of a next-trigger computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTrigger {
    /// The trigger instant, in the zone it was computed in.
    pub at: DateTime<Tz>,
    /// `true` if today's occurrence had already passed.
    pub rolled_over: bool,
}

impl NextTrigger {
    pub fn epoch_ms(&self) -> i64 {
        self.at.timestamp_millis()
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.at.with_timezone(&Utc)
    }
}

/// Computes the next occurrence of `hour:minute:00.000` in `zone` after `now`.
///
/// `hour` must be below 24 and `minute` below 60, as `AlarmConfig::load`
/// guarantees. Out-of-range values are treated as midnight.
///
/// Today's occurrence is used when it is strictly after `now`; otherwise the
/// date is advanced by one calendar day in `zone` and the wall-clock time is
/// pinned again, so DST changes keep the alarm at the same local time.
pub fn next_trigger(hour: u8, minute: u8, zone: Tz, now: DateTime<Utc>) -> NextTrigger {
    let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0).unwrap_or_default();
    let today = now.with_timezone(&zone).date_naive();
    let candidate = at_local(zone, today, time);
    if candidate.with_timezone(&Utc) > now {
        return NextTrigger {
            at: candidate,
            rolled_over: false,
        };
    }
    // Only fails at the end of the representable calendar.
    let tomorrow = today.succ_opt().unwrap_or(today);
    NextTrigger {
        at: at_local(zone, tomorrow, time),
        rolled_over: true,
    }
}

fn at_local(zone: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    localize(zone, date.and_time(time))
}

/// The UTC offset of `zone` at `at`, in whole minutes.
pub fn offset_minutes(zone: Tz, at: DateTime<Utc>) -> i32 {
    zone.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc() / 60
}

/// Converts epoch milliseconds to an instant, if representable.
pub fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}
