//! # Wakeclock
//!
//! Recovery and hand-off logic for a single daily wake alarm.
//!
//! Wakeclock owns the decision logic that sits between the host OS and the
//! application that wants to be woken up every day at a fixed local time. It is
//! designed as a library: every platform service it touches is injected behind a
//! trait, and every entry point takes the current instant as an argument.
//!
//! ## Core Concepts
//!
//! - **AlarmRestorer**: Runs on boot or clock/zone change. Reads the persisted
//!   `AlarmConfig`, computes the next trigger instant in the configured zone and
//!   re-registers it under a fixed key, so repeated runs never stack alarms.
//! - **WakeHandler**: Runs when the registered alarm fires. Keeps the screen lit
//!   for a bounded time and launches the consumer app with the wake context.
//! - **AlarmClient**: The consumer-side counterpart that writes the config, arms,
//!   cancels and checks whether a launch came from the alarm.
//! - **WakeclockEngine**: The dispatch shim. It routes host signals to the
//!   handlers, contains every failure, and broadcasts outcomes as events.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wakeclock::prelude::*;
//! use wakeclock::sim::SimulatedPlatform;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Wire the collaborators. Production builds pass real adapters here.
//!     let store = Arc::new(MemoryStore::new());
//!     let platform = Arc::new(SimulatedPlatform::new());
//!     let engine = WakeclockEngine::new(
//!         WakeclockConfig::default(),
//!         store.clone(),
//!         platform.clone(),
//!         platform.clone(),
//!         platform.clone(),
//!     );
//!
//!     // 2. The consumer arms tomorrow's 07:30.
//!     let now = chrono::Utc::now();
//!     let target = (now + chrono::Duration::days(1)).date_naive().and_hms_opt(7, 30, 0).unwrap();
//!     engine.client().schedule(target, chrono_tz::UTC, now)?;
//!
//!     // 3. After a reboot the OS delivers BOOT_COMPLETED.
//!     let outcome = engine.dispatch_host(&HostEvent::BootCompleted, now);
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Wake Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod platform;
pub mod sim;
pub mod store;
pub mod time;

/// A prelude module for easy importing of the most common Wakeclock types.
pub mod prelude {
    pub use crate::common::{HostEvent, RegistrationKey};
    pub use crate::components::client::AlarmClient;
    pub use crate::components::restorer::{AlarmRestorer, RestoreOutcome};
    pub use crate::components::wake::{WakeHandler, WakeOutcome};
    pub use crate::config::WakeclockConfig;
    pub use crate::engine::{Signal, WakeclockEngine};
    pub use crate::error::WakeError;
    pub use crate::events::{RestoreEvent, SystemEvent, WakeEvent};
    pub use crate::platform::{
        AppLauncher, ExactAlarmScheduler, FireAction, IlluminationResource, LaunchMode,
        LaunchPayload, LaunchTarget, ShowAction, TriggerEvent,
    };
    pub use crate::store::{AlarmConfig, MemoryStore, PersistenceStore, StoreValue};
}
