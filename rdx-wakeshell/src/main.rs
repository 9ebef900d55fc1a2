use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wakeclock::prelude::*;
use wakeclock::sim::SimulatedPlatform;
use wakeclock::{ENGINE_NAME, VERSION as LIB_VERSION};

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Colors the command word apart from its arguments.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.cyan()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(64);
    println!("{}", rule.dimmed());
    println!(
        "{}  shell v{}  {} v{}",
        "wakeshell".cyan().bold(),
        SHELL_VERSION,
        ENGINE_NAME,
        LIB_VERSION
    );
    println!("{}", "Drives the wake alarm against a simulated device.".dimmed());
    println!("{}", rule.dimmed());
}

/// Everything the shell drives: the engine, its simulated platform and clock.
struct Session {
    engine: WakeclockEngine,
    store: Arc<MemoryStore>,
    platform: Arc<SimulatedPlatform>,
    clock: Arc<Mutex<DateTime<Utc>>>,
    host_zone: Arc<Mutex<Tz>>,
}

impl Session {
    fn new(config: WakeclockConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(SimulatedPlatform::new());
        let clock = Arc::new(Mutex::new(Utc::now()));
        let host_zone = Arc::new(Mutex::new(config.default_timezone));
        let engine_clock = clock.clone();
        let engine_zone = host_zone.clone();
        let engine = WakeclockEngine::new(
            config,
            store.clone(),
            platform.clone(),
            platform.clone(),
            platform.clone(),
        )
        .with_clock(move || *engine_clock.lock())
        .with_system_zone(move || *engine_zone.lock());
        Self {
            engine,
            store,
            platform,
            clock,
            host_zone,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.engine.now()
    }

    fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.lock() = now;
    }

    /// Moves the simulated device to `zone` and delivers the zone change signal.
    fn move_to_zone(&self, zone: &str) {
        match zone.parse::<Tz>() {
            Ok(zone) => {
                *self.host_zone.lock() = zone;
                println!("--> Device zone is now {}", zone.to_string().green());
                self.engine
                    .dispatch_host(&HostEvent::TimezoneChanged, self.now());
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    /// Moves the clock to `until`, firing every alarm that falls due on the way.
    fn advance_to(&self, until: DateTime<Utc>) {
        while let Some(due) = self.platform.next_due().filter(|due| *due <= until) {
            self.set_now(due);
            for fire in self.platform.take_due(due) {
                println!("<-- [ALARM] firing at {}", due.to_string().bold());
                self.engine.dispatch_fire(&fire, due);
            }
        }
        self.set_now(until);
        println!("--> Clock is now {}", until);
    }

    fn set_alarm(&self, time: &str, zone: Option<&str>) {
        let Ok(time) = NaiveTime::parse_from_str(time, "%H:%M") else {
            println!("Error: '{}' is not a valid HH:MM time.", time);
            return;
        };
        let zone = match zone.map(str::parse::<Tz>) {
            None => self.engine.system_zone(),
            Some(Ok(zone)) => zone,
            Some(Err(e)) => {
                println!("Error: {}", e);
                return;
            }
        };
        let now = self.now();
        let today = now.with_timezone(&zone).date_naive();
        let mut target = today.and_time(time);
        if target <= now.with_timezone(&zone).naive_local() {
            target += Duration::days(1);
        }
        match self.engine.client().schedule(target, zone, now) {
            Ok(armed) => println!("--> Alarm armed for {}", armed.at.to_string().green()),
            Err(e) => println!("--> {} {}", "Not armed:".red(), e),
        }
    }

    fn write_raw(&self, key: &str, value: &str) {
        let value = match value.parse::<i64>() {
            Ok(v) => StoreValue::Int(v),
            Err(_) => StoreValue::Text(value.to_string()),
        };
        match self.store.set(key, value) {
            Ok(()) => println!("--> Wrote `{}`.", key),
            Err(e) => println!("--> Error: {}", e),
        }
    }

    fn print_store(&self) {
        println!("Store ({} writes):", self.store.writes());
        for (key, value) in self.store.snapshot() {
            println!("  {:<14} {:?}", key, value);
        }
    }

    fn print_pending(&self) {
        println!("Pending alarms:");
        for (key, alarm) in self.platform.pending() {
            println!(
                "  {} at {} ({} {:02}:{:02})",
                key,
                alarm.trigger_at,
                alarm.fire.action,
                alarm.fire.event.wake_hour,
                alarm.fire.event.wake_minute
            );
        }
    }

    fn print_launches(&self) {
        println!("Launches:");
        for launch in self.platform.launches() {
            let payload = describe_payload(&launch.payload);
            println!("  {} {:?} {}", launch.target.0, launch.mode, payload);
        }
        let woke = self
            .engine
            .client()
            .should_auto_wake(self.platform.launches().last().map(|l| &l.payload), self.now());
        println!("  launched by alarm: {}", woke);
    }
}

fn describe_payload(payload: &LaunchPayload) -> String {
    format!(
        "{{tap_alarm_wake: {}, wake_hour: {}, wake_min: {}, tz_id: {:?}, tz_offset_min: {}, alarm_trigger_time: {}}}",
        payload.tap_alarm_wake,
        payload.wake_hour,
        payload.wake_min,
        payload.tz_id,
        payload.tz_offset_min,
        payload.alarm_trigger_time
    )
}

/// Spawns tasks printing the restore and wake event streams.
fn spawn_event_listeners(engine: &WakeclockEngine) {
    let mut restore_rx = engine.subscribe_restore_events();
    tokio::spawn(async move {
        while let Ok(event) = restore_rx.recv().await {
            println!("\n<-- [RESTORE] {} => {:?}\n>> ", event.signal, event.outcome);
        }
    });

    let mut wake_rx = engine.subscribe_wake_events();
    tokio::spawn(async move {
        while let Ok(event) = wake_rx.recv().await {
            println!("\n<-- [WAKE] {} => {:?}\n>> ", event.action, event.outcome);
        }
    });
}

fn print_help() {
    println!("Available commands:");
    println!("  set <HH:MM> [ZONE]    - Arms the alarm as the consumer app would.");
    println!("  cancel                - Cancels the pending alarm.");
    println!("  boot | locked-boot    - Delivers a boot signal.");
    println!("  time-set              - Delivers a clock change signal.");
    println!("  timezone-changed      - Delivers a zone change signal.");
    println!("  zone <ZONE>           - Moves the device to ZONE and delivers the zone change.");
    println!("  signal <ACTION>       - Delivers an arbitrary host action.");
    println!("  reboot                - Drops pending alarms, then delivers BOOT_COMPLETED.");
    println!("  advance <MINUTES>     - Moves the clock forward, firing due alarms.");
    println!("  jump                  - Moves the clock to the next pending alarm.");
    println!("  now                   - Shows the simulated clock.");
    println!("  next [ZONE]           - Shows the cached next wake in local time.");
    println!("  permission            - Shows whether exact alarms may be scheduled.");
    println!("  store | pending       - Shows the store or the pending alarms.");
    println!("  launches              - Shows launches and whether the last one was the alarm.");
    println!("  raw <KEY> <VALUE>     - Writes a raw store value (try `raw wake_hour 25`).");
    println!("  grant | deny          - Grants or revokes the exact alarm permission.");
    println!("  dim on | dim off      - Makes illumination fail or succeed.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let config_path = env::var("WAKECLOCK_CONFIG").ok().map(PathBuf::from);
    let config = WakeclockConfig::load(config_path.as_deref())?;
    info!(zone = %config.default_timezone, "Configuration loaded.");

    let session = Session::new(config);
    spawn_event_listeners(&session.engine);

    let mut rl = Editor::new()?;
    let helper = CommandHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "set" => match args.get(1) {
                            Some(time) => session.set_alarm(time, args.get(2).copied()),
                            None => println!("Usage: set <HH:MM> [ZONE]"),
                        },
                        "cancel" => match session.engine.client().cancel() {
                            Ok(()) => println!("--> Alarm cancelled."),
                            Err(e) => println!("--> Error: {}", e),
                        },
                        "boot" | "locked-boot" | "time-set" | "timezone-changed" => {
                            session
                                .engine
                                .dispatch_host(&HostEvent::from_action(command), session.now());
                        }
                        "signal" => match args.get(1) {
                            Some(action) => {
                                session
                                    .engine
                                    .dispatch_host(&HostEvent::from_action(action), session.now());
                            }
                            None => println!("Usage: signal <ACTION>"),
                        },
                        "zone" => match args.get(1) {
                            Some(zone) => session.move_to_zone(zone),
                            None => println!("Usage: zone <ZONE>"),
                        },
                        "reboot" => {
                            session.platform.reboot();
                            session
                                .engine
                                .dispatch_host(&HostEvent::BootCompleted, session.now());
                        }
                        "advance" => match args.get(1).map(|m| m.parse::<i64>()) {
                            Some(Ok(minutes)) => {
                                session.advance_to(session.now() + Duration::minutes(minutes))
                            }
                            Some(Err(_)) => println!("Error: minutes must be a number."),
                            None => println!("Usage: advance <MINUTES>"),
                        },
                        "jump" => match session.platform.next_due() {
                            Some(due) => session.advance_to(due),
                            None => println!("--> Nothing pending."),
                        },
                        "now" => println!("--> {}", session.now()),
                        "next" => {
                            let zone = match args.get(1).map(|z| z.parse::<Tz>()) {
                                Some(Ok(zone)) => zone,
                                Some(Err(e)) => {
                                    println!("Error: {}", e);
                                    continue;
                                }
                                None => session.engine.system_zone(),
                            };
                            match session.engine.client().next_wake_local(zone) {
                                Some(at) => println!("--> Next wake: {}", at.to_string().green()),
                                None => println!("--> No wake cached."),
                            }
                        }
                        "permission" => {
                            println!("--> Exact alarms allowed: {}", session.engine.client().check_permission())
                        }
                        "store" => session.print_store(),
                        "pending" => session.print_pending(),
                        "launches" => session.print_launches(),
                        "raw" => match (args.get(1), args.get(2)) {
                            (Some(key), Some(value)) => session.write_raw(key, value),
                            _ => println!("Usage: raw <KEY> <VALUE>"),
                        },
                        "grant" => session.platform.allow_exact_alarms(true),
                        "deny" => session.platform.allow_exact_alarms(false),
                        "dim" => match args.get(1) {
                            Some(&"on") => session.platform.fail_illumination(Some("screen wake denied")),
                            Some(&"off") => session.platform.fail_illumination(None),
                            _ => println!("Usage: dim on|off"),
                        },
                        "help" => print_help(),
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting wakeshell...");
                break;
            }
        }
    }

    Ok(())
}
