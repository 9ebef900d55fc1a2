//! The dispatch shim between the host OS and the Wakeclock handlers.

use crate::common::HostEvent;
use crate::components::client::AlarmClient;
use crate::components::restorer::{AlarmRestorer, RestoreOutcome};
use crate::components::wake::{WakeHandler, WakeOutcome};
use crate::config::WakeclockConfig;
use crate::events::{RestoreEvent, SystemEvent, WakeEvent};
use crate::platform::{AppLauncher, ExactAlarmScheduler, FireAction, IlluminationResource};
use crate::store::PersistenceStore;
use crate::time::{fixed_zone, ZoneSource};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// A source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A signal queued for the engine's `run` loop.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A host broadcast such as boot completion.
    Host(HostEvent),
    /// The platform delivered a registered fire action.
    Fire(FireAction),
    /// Stop the run loop.
    Shutdown,
}

/// The main Wakeclock engine.
///
/// This struct is the outermost boundary toward the host. It owns one restorer,
/// one wake handler and one client over the same collaborators, routes every
/// host signal to the right handler, and turns each outcome into a broadcast
/// event. No handler outcome is ever returned to the host as an error. The
/// engine is designed to be cloned and shared across tasks.
#[derive(Clone)]
pub struct WakeclockEngine {
    config: Arc<WakeclockConfig>,
    restorer: AlarmRestorer,
    wake: WakeHandler,
    client: AlarmClient,
    clock: Clock,
    system_zone: ZoneSource,
    system_event_sender: broadcast::Sender<SystemEvent>,
    restore_event_sender: broadcast::Sender<RestoreEvent>,
    wake_event_sender: broadcast::Sender<WakeEvent>,
}

// Core implementation block for internal logic.
impl WakeclockEngine {
    /// Creates a new `WakeclockEngine` over the given collaborators.
    pub fn new(
        config: WakeclockConfig,
        store: Arc<dyn PersistenceStore>,
        scheduler: Arc<dyn ExactAlarmScheduler>,
        illumination: Arc<dyn IlluminationResource>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        const CHANNEL_CAPACITY: usize = 64;
        let (system_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (restore_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (wake_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        let restorer =
            AlarmRestorer::new(&config, store.clone(), scheduler.clone(), launcher.clone());
        let wake = WakeHandler::new(&config, illumination, launcher.clone());
        let client = AlarmClient::new(&config, store, scheduler, launcher);

        Self {
            system_zone: fixed_zone(config.default_timezone),
            config: Arc::new(config),
            restorer,
            wake,
            client,
            clock: Arc::new(Utc::now),
            system_event_sender,
            restore_event_sender,
            wake_event_sender,
        }
    }

    /// Replaces the wall clock used by `run`.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the source of the host's default zone.
    ///
    /// The restorer reads it on every restore, so a zone change followed by
    /// `HostEvent::TimezoneChanged` recomputes an alarm with no stored zone.
    pub fn with_system_zone(mut self, zone: impl Fn() -> Tz + Send + Sync + 'static) -> Self {
        self.system_zone = Arc::new(zone);
        self.restorer = self.restorer.with_system_zone(self.system_zone.clone());
        self
    }

    /// Runs the engine's dispatch loop.
    ///
    /// Signals are handled one at a time, in arrival order, each against the
    /// engine clock at the moment it is dequeued. The loop ends on
    /// `Signal::Shutdown`, when every sender is dropped, or on Ctrl+C.
    pub async fn run(&self, mut signals: mpsc::Receiver<Signal>) -> anyhow::Result<()> {
        info!("WakeclockEngine starting up...");
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: (self.clock)(),
            })
            .ok();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                biased;
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl+C: {}", e);
                    }
                    info!("Shutdown signal received.");
                    break;
                }
                signal = signals.recv() => match signal {
                    Some(Signal::Host(event)) => {
                        self.dispatch_host(&event, (self.clock)());
                    }
                    Some(Signal::Fire(fire)) => {
                        self.dispatch_fire(&fire, (self.clock)());
                    }
                    Some(Signal::Shutdown) | None => break,
                },
            }
        }

        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("WakeclockEngine has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    fn log_restore(&self, event: &RestoreEvent) {
        match &event.outcome {
            RestoreOutcome::Ignored(_) => debug!(signal = %event.signal, "Restore ignored."),
            RestoreOutcome::Skipped(err) if err.is_benign() => {
                debug!(signal = %event.signal, "Nothing to restore.")
            }
            RestoreOutcome::Skipped(err) => {
                warn!(signal = %event.signal, error = %err, "Restore skipped.")
            }
            RestoreOutcome::Failed { error, trigger } => {
                warn!(signal = %event.signal, error = %error, next = %trigger.at, "Restore failed.")
            }
            RestoreOutcome::Scheduled(alarm) => {
                info!(signal = %event.signal, next = %alarm.trigger.at, "Restore complete.")
            }
        }
    }

    #[doc(hidden)]
    fn log_wake(&self, event: &WakeEvent) {
        match &event.outcome {
            WakeOutcome::Ignored { action } => debug!(%action, "Wake ignored."),
            WakeOutcome::Launched { illumination, .. } => info!(
                illuminated = illumination.is_none(),
                "Wake complete."
            ),
            WakeOutcome::Aborted { error, .. } => warn!(error = %error, "Wake aborted."),
        }
    }
}

// Public API implementation block.
impl WakeclockEngine {
    /// Routes a host signal to the restorer and broadcasts the outcome.
    pub fn dispatch_host(&self, signal: &HostEvent, now: DateTime<Utc>) -> RestoreOutcome {
        let outcome = self.restorer.on_event(signal, now);
        let event = RestoreEvent {
            signal: signal.clone(),
            at: now,
            outcome: outcome.clone(),
        };
        self.log_restore(&event);
        self.restore_event_sender.send(event).ok();
        outcome
    }

    /// Routes a fired action to the wake handler and broadcasts the outcome.
    pub fn dispatch_fire(&self, fire: &FireAction, now: DateTime<Utc>) -> WakeOutcome {
        let outcome = self.wake.handle(fire, now);
        let event = WakeEvent {
            action: fire.action.clone(),
            at: now,
            outcome: outcome.clone(),
        };
        self.log_wake(&event);
        self.wake_event_sender.send(event).ok();
        outcome
    }

    /// The consumer-side client wired to the same collaborators.
    pub fn client(&self) -> &AlarmClient {
        &self.client
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &WakeclockConfig {
        &self.config
    }

    /// The host's current default zone.
    pub fn system_zone(&self) -> Tz {
        (self.system_zone)()
    }

    /// The engine clock's current reading.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the `RestoreEvent` stream.
    pub fn subscribe_restore_events(&self) -> broadcast::Receiver<RestoreEvent> {
        self.restore_event_sender.subscribe()
    }

    /// Subscribes to the `WakeEvent` stream.
    pub fn subscribe_wake_events(&self) -> broadcast::Receiver<WakeEvent> {
        self.wake_event_sender.subscribe()
    }
}
