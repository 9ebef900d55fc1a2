//! Defines all public event types broadcast by the Wakeclock engine.
//!
//! Every handler run ends in exactly one of these events. They are the only way
//! an outcome leaves the engine; nothing is returned to the host.

use crate::common::HostEvent;
use crate::components::restorer::RestoreOutcome;
use crate::components::wake::WakeOutcome;
use chrono::{DateTime, Utc};

/// Events related to the lifecycle of the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { timestamp: DateTime<Utc> },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
}

/// Fired after every host signal routed to the restorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreEvent {
    /// The host signal that started the run.
    pub signal: HostEvent,
    /// The instant the run computed against.
    pub at: DateTime<Utc>,
    pub outcome: RestoreOutcome,
}

/// Fired after every fire action routed to the wake handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub action: String,
    pub at: DateTime<Utc>,
    pub outcome: WakeOutcome,
}
