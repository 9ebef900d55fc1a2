//! The persisted alarm configuration and the key/value store behind it.
//!
//! The store itself is an injected collaborator. `MemoryStore` is the in-process
//! implementation used by the simulator and the tests.

use crate::common::{KEY_NEXT_EPOCH_MS, KEY_TZ_ID, KEY_TZ_OFFSET_MIN, KEY_WAKE_HOUR, KEY_WAKE_MIN};
use crate::error::{StoreError, StoreResult, WakeError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// A value held by the persistence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Int(i64),
    Text(String),
}

impl StoreValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            Self::Int(_) => None,
        }
    }
}

impl From<i64> for StoreValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for StoreValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A namespaced, process-local key/value store that survives reboot.
pub trait PersistenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<StoreValue>;
    fn set(&self, key: &str, value: StoreValue) -> StoreResult<()>;
    fn contains(&self, key: &str) -> bool;
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// The persisted alarm configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmConfig {
    pub wake_hour: u8,
    pub wake_minute: u8,
    /// `None` means "use the system default zone".
    pub timezone_id: Option<String>,
    /// Informational only. Carried through to the consumer, never used to
    /// compute a trigger.
    pub timezone_offset_minutes: i32,
    /// The last computed trigger instant. A cache, not authoritative.
    pub next_trigger_epoch_ms: Option<i64>,
}

impl AlarmConfig {
    /// Reads and validates the configuration from `store`.
    ///
    /// # Errors
    /// - `MissingConfig` if either the hour or minute key is absent.
    /// - `InvalidConfig` if either is out of range.
    /// - `InvalidValue` if the hour or minute holds a value of the wrong type.
    ///
    /// The zone and offset never fail a load. A numeric `tz_id` is kept as its
    /// decimal text, which no zone resolves, so the default zone is used. A
    /// `tz_offset_min` of the wrong type or outside the `i32` range reads as 0.
    pub fn load(store: &dyn PersistenceStore) -> Result<Self, WakeError> {
        if !store.contains(KEY_WAKE_HOUR) || !store.contains(KEY_WAKE_MIN) {
            return Err(WakeError::MissingConfig);
        }

        let hour = read_int(store, KEY_WAKE_HOUR)?.ok_or(WakeError::MissingConfig)?;
        let minute = read_int(store, KEY_WAKE_MIN)?.ok_or(WakeError::MissingConfig)?;
        let (wake_hour, wake_minute) = match (u8::try_from(hour), u8::try_from(minute)) {
            (Ok(h), Ok(m)) if h <= 23 && m <= 59 => (h, m),
            _ => return Err(WakeError::InvalidConfig { hour, minute }),
        };

        let timezone_id = match store.get(KEY_TZ_ID) {
            None => None,
            Some(StoreValue::Text(id)) => Some(id),
            Some(StoreValue::Int(v)) => {
                warn!(key = KEY_TZ_ID, value = v, "Stored zone is not text.");
                Some(v.to_string())
            }
        };

        let timezone_offset_minutes = match store.get(KEY_TZ_OFFSET_MIN) {
            None => 0,
            Some(StoreValue::Int(v)) => i32::try_from(v).unwrap_or_else(|_| {
                warn!(key = KEY_TZ_OFFSET_MIN, value = v, "Stored offset out of range, using 0.");
                0
            }),
            Some(StoreValue::Text(v)) => {
                warn!(key = KEY_TZ_OFFSET_MIN, value = %v, "Stored offset is not an integer, using 0.");
                0
            }
        };

        // The cache is never worth failing over.
        let next_trigger_epoch_ms = store.get(KEY_NEXT_EPOCH_MS).and_then(|v| v.as_int());

        Ok(Self {
            wake_hour,
            wake_minute,
            timezone_id,
            timezone_offset_minutes,
            next_trigger_epoch_ms,
        })
    }

    /// Writes every field of the configuration to `store`.
    pub fn save(&self, store: &dyn PersistenceStore) -> StoreResult<()> {
        store.set(KEY_WAKE_HOUR, i64::from(self.wake_hour).into())?;
        store.set(KEY_WAKE_MIN, i64::from(self.wake_minute).into())?;
        match &self.timezone_id {
            Some(id) => store.set(KEY_TZ_ID, id.as_str().into())?,
            None => store.remove(KEY_TZ_ID)?,
        }
        store.set(KEY_TZ_OFFSET_MIN, i64::from(self.timezone_offset_minutes).into())?;
        match self.next_trigger_epoch_ms {
            Some(ms) => store.set(KEY_NEXT_EPOCH_MS, ms.into()),
            None => store.remove(KEY_NEXT_EPOCH_MS),
        }
    }
}

fn read_int(store: &dyn PersistenceStore, key: &'static str) -> Result<Option<i64>, WakeError> {
    match store.get(key) {
        None => Ok(None),
        Some(StoreValue::Int(v)) => Ok(Some(v)),
        Some(StoreValue::Text(_)) => Err(WakeError::InvalidValue {
            key,
            expected: "integer",
        }),
    }
}

/// An in-memory `PersistenceStore`.
///
/// Counts writes so callers can assert that an operation left the store alone,
/// and can be switched into a failing mode to exercise write-error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, StoreValue>>,
    writes: AtomicUsize,
    fail_writes: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`. Seeding is not counted as writes.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, StoreValue)>,
        K: Into<String>,
    {
        let store = Self::new();
        store
            .entries
            .lock()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        store
    }

    /// Number of successful `set`/`remove` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Makes every subsequent write fail with `reason`, or succeed again with `None`.
    pub fn fail_writes(&self, reason: Option<&str>) {
        *self.fail_writes.lock() = reason.map(str::to_string);
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, StoreValue> {
        self.entries.lock().clone()
    }

    fn check_writable(&self, key: &str) -> StoreResult<()> {
        match self.fail_writes.lock().as_ref() {
            Some(reason) => Err(StoreError::WriteFailed {
                key: key.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<StoreValue> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: StoreValue) -> StoreResult<()> {
        self.check_writable(key)?;
        self.entries.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable(key)?;
        self.entries.lock().remove(key);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(hour: i64, minute: i64) -> MemoryStore {
        MemoryStore::with_entries([
            (KEY_WAKE_HOUR, StoreValue::Int(hour)),
            (KEY_WAKE_MIN, StoreValue::Int(minute)),
        ])
    }

    #[test]
    fn load_reads_all_fields() {
        let store = MemoryStore::with_entries([
            (KEY_WAKE_HOUR, StoreValue::Int(6)),
            (KEY_WAKE_MIN, StoreValue::Int(45)),
            (KEY_TZ_ID, StoreValue::from("Europe/Berlin")),
            (KEY_TZ_OFFSET_MIN, StoreValue::Int(60)),
            (KEY_NEXT_EPOCH_MS, StoreValue::Int(1_700_000_000_000)),
        ]);
        let config = AlarmConfig::load(&store).unwrap();
        assert_eq!(
            config,
            AlarmConfig {
                wake_hour: 6,
                wake_minute: 45,
                timezone_id: Some("Europe/Berlin".into()),
                timezone_offset_minutes: 60,
                next_trigger_epoch_ms: Some(1_700_000_000_000),
            }
        );
    }

    #[test]
    fn optional_fields_default() {
        let config = AlarmConfig::load(&seeded(0, 0)).unwrap();
        assert_eq!(config.timezone_id, None);
        assert_eq!(config.timezone_offset_minutes, 0);
        assert_eq!(config.next_trigger_epoch_ms, None);
    }

    #[test]
    fn missing_minute_is_missing_config() {
        let store = MemoryStore::with_entries([(KEY_WAKE_HOUR, StoreValue::Int(7))]);
        assert_eq!(AlarmConfig::load(&store), Err(WakeError::MissingConfig));
    }

    #[test]
    fn range_edges() {
        assert!(AlarmConfig::load(&seeded(23, 59)).is_ok());
        assert_eq!(
            AlarmConfig::load(&seeded(24, 0)),
            Err(WakeError::InvalidConfig { hour: 24, minute: 0 })
        );
        assert_eq!(
            AlarmConfig::load(&seeded(-1, 30)),
            Err(WakeError::InvalidConfig { hour: -1, minute: 30 })
        );
        assert_eq!(
            AlarmConfig::load(&seeded(7, 60)),
            Err(WakeError::InvalidConfig { hour: 7, minute: 60 })
        );
    }

    #[test]
    fn text_hour_is_invalid_value() {
        let store = MemoryStore::with_entries([
            (KEY_WAKE_HOUR, StoreValue::from("seven")),
            (KEY_WAKE_MIN, StoreValue::Int(0)),
        ]);
        assert_eq!(
            AlarmConfig::load(&store),
            Err(WakeError::InvalidValue {
                key: KEY_WAKE_HOUR,
                expected: "integer"
            })
        );
    }

    #[test]
    fn numeric_zone_loads_as_unresolvable_text() {
        let store = MemoryStore::with_entries([
            (KEY_WAKE_HOUR, StoreValue::Int(7)),
            (KEY_WAKE_MIN, StoreValue::Int(30)),
            (KEY_TZ_ID, StoreValue::Int(9)),
        ]);
        let config = AlarmConfig::load(&store).unwrap();
        assert_eq!(config.timezone_id.as_deref(), Some("9"));
    }

    #[test]
    fn bad_offset_reads_as_zero() {
        for offset in [StoreValue::from("+09:00"), StoreValue::Int(i64::from(i32::MAX) + 1)] {
            let store = MemoryStore::with_entries([
                (KEY_WAKE_HOUR, StoreValue::Int(7)),
                (KEY_WAKE_MIN, StoreValue::Int(30)),
                (KEY_TZ_OFFSET_MIN, offset),
            ]);
            assert_eq!(AlarmConfig::load(&store).unwrap().timezone_offset_minutes, 0);
        }
    }

    #[test]
    fn save_then_load_keeps_the_config() {
        let store = MemoryStore::new();
        let config = AlarmConfig {
            wake_hour: 21,
            wake_minute: 5,
            timezone_id: Some("America/New_York".into()),
            timezone_offset_minutes: -300,
            next_trigger_epoch_ms: Some(42),
        };
        config.save(&store).unwrap();
        assert_eq!(AlarmConfig::load(&store).unwrap(), config);
    }

    #[test]
    fn failing_store_rejects_writes_without_counting_them() {
        let store = MemoryStore::new();
        store.fail_writes(Some("disk full"));
        let err = store.set(KEY_NEXT_EPOCH_MS, StoreValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            StoreError::WriteFailed {
                key: KEY_NEXT_EPOCH_MS.into(),
                reason: "disk full".into()
            }
        );
        assert_eq!(store.writes(), 0);
        assert!(!store.contains(KEY_NEXT_EPOCH_MS));
    }

    #[test]
    fn store_values_serialize_untagged() {
        assert_eq!(serde_json::to_string(&StoreValue::Int(7)).unwrap(), "7");
        assert_eq!(
            serde_json::from_str::<StoreValue>("\"UTC\"").unwrap(),
            StoreValue::from("UTC")
        );
    }
}
