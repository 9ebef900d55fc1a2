use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wakeclock::prelude::*;
use wakeclock::sim::SimulatedPlatform;

/// Walks one full cycle against the simulated platform: the consumer arms an
/// alarm, the device reboots, the clock is changed, the alarm fires and the
/// consumer checks how it was launched.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    // 2. Load the configuration (optional file given as the first argument).
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = WakeclockConfig::load(path.as_deref())?;
    let zone = config.default_timezone;

    // 3. Wire the engine to a simulated platform and a simulated clock.
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(SimulatedPlatform::new());
    let start = Utc
        .with_ymd_and_hms(2026, 3, 1, 21, 0, 0)
        .single()
        .context("demo start time is not representable")?;
    let clock = Arc::new(Mutex::new(start));
    let engine = {
        let clock = clock.clone();
        WakeclockEngine::new(
            config,
            store.clone(),
            platform.clone(),
            platform.clone(),
            platform.clone(),
        )
        .with_clock(move || *clock.lock())
    };

    // 4. Spawn listeners for the event streams.
    spawn_event_listeners(&engine);

    let (signals, receiver) = mpsc::channel(16);
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run(receiver).await });

    // 5. The consumer arms tomorrow's 06:45 in the configured zone.
    let now = engine.now();
    let target = (now.with_timezone(&zone) + Duration::days(1))
        .date_naive()
        .and_hms_opt(6, 45, 0)
        .unwrap_or_default();
    let armed = engine.client().schedule(target, zone, now)?;
    info!("[CLIENT] Armed for {}", armed.at);

    // 6. Reboot: the pending alarm is lost and restored from the store.
    platform.reboot();
    signals.send(Signal::Host(HostEvent::BootCompleted)).await?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // 7. The user moves the clock forward by two days; the restorer rolls over.
    advance(&clock, Duration::days(2));
    signals.send(Signal::Host(HostEvent::TimeChanged)).await?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // 8. Jump to the pending trigger and deliver the fire action.
    if let Some(due) = platform.next_due() {
        *clock.lock() = due;
        for fire in platform.take_due(due) {
            signals.send(Signal::Fire(fire)).await?;
        }
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // 9. The consumer starts and checks how it was launched.
    let launch = platform.launches().pop();
    let woke = engine
        .client()
        .should_auto_wake(launch.as_ref().map(|l| &l.payload), engine.now());
    info!("[CLIENT] Launched by alarm: {}", woke);
    if let Some(launch) = launch {
        info!("[CLIENT] Payload: {}", serde_json::to_string(&launch.payload)?);
    }

    signals.send(Signal::Shutdown).await?;
    handle.await??;
    Ok(())
}

fn advance(clock: &Mutex<DateTime<Utc>>, by: Duration) {
    let mut now = clock.lock();
    *now += by;
    info!("[CLOCK] => {}", *now);
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &WakeclockEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut restore_rx = engine.subscribe_restore_events();
    tokio::spawn(async move {
        while let Ok(event) = restore_rx.recv().await {
            info!("[RESTORE] {} => {:?}", event.signal, event.outcome);
        }
    });

    let mut wake_rx = engine.subscribe_wake_events();
    tokio::spawn(async move {
        while let Ok(event) = wake_rx.recv().await {
            info!("[WAKE] {} => {:?}", event.action, event.outcome);
        }
    });
}
