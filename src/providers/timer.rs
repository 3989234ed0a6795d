//! Countdown timer and alarm, driven by `action timer ...` commands.
//!
//! ```text
//! action timer timer up 5      add five minutes
//! action timer timer start     count down once per minute
//! action timer timer reset     stop and restore the default
//! action timer alarm down 30   move the alarm target
//! action timer alarm start     count down to the target clock time
//! ```
//!
//! Both countdowns wake on minute boundaries and publish after every tick.
//! Starting, resetting and finishing send a desktop notification through the
//! configured command.

use super::until_next_minute;
use crate::config::TimerConfig;
use crate::shutdown::Shutdown;
use crate::traits::{ActionProvider, Provider, ProviderError, Publisher};
use chrono::{Local, NaiveTime, Timelike};
use log::{debug, warn};
use serde::Serialize;
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};

/// Largest timer value: 99:59.
const TIMER_MAX_MINUTES: i64 = 99 * 60 + 59;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Published value of the `timer` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerState {
    /// Remaining timer value, `HH:MM`.
    pub timer: String,
    /// Alarm target (`HH:MM`), or time remaining while the alarm runs.
    pub alarm: String,
    pub timer_active: bool,
    pub alarm_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Countdown {
    Timer,
    Alarm,
}

/// A desktop notification to send once the state lock is released.
struct Note {
    app: &'static str,
    message: &'static str,
    timeout_ms: u32,
    urgency: &'static str,
}

#[derive(Debug)]
struct Clock {
    timer_minutes: i64,
    timer_stop: Option<Shutdown>,
    /// Minutes after midnight.
    alarm_target: i64,
    alarm_stop: Option<Shutdown>,
}

impl Clock {
    fn timer_running(&self) -> bool {
        self.timer_stop.is_some()
    }

    fn alarm_running(&self) -> bool {
        self.alarm_stop.is_some()
    }

    fn state_at(&self, now: NaiveTime) -> TimerState {
        let alarm = if self.alarm_running() {
            format_hm(alarm_remaining(self.alarm_target, now))
        } else {
            format_hm(self.alarm_target)
        };
        TimerState {
            timer: format_hm(self.timer_minutes),
            alarm,
            timer_active: self.timer_running(),
            alarm_active: self.alarm_running(),
        }
    }

    fn stop_timer(&mut self) {
        if let Some(token) = self.timer_stop.take() {
            token.trigger();
        }
    }

    fn stop_alarm(&mut self) {
        if let Some(token) = self.alarm_stop.take() {
            token.trigger();
        }
    }
}

/// State shared between the action handler and the countdown threads.
struct Shared {
    config: TimerConfig,
    clock: Mutex<Clock>,
    publisher: Mutex<Option<Publisher>>,
    stop: Shutdown,
}

impl Shared {
    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn state(&self) -> TimerState {
        self.clock().state_at(Local::now().time())
    }

    fn publish(&self) {
        let state = self.state();
        let publisher = self.publisher.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(p) = publisher.as_ref() {
            p.publish(&state);
        }
    }

    fn notify(&self, note: Note) {
        let Some(program) = self.config.notify_command.as_deref() else {
            return;
        };
        let mut cmd = Command::new(program);
        if !note.app.is_empty() {
            cmd.args(["-a", note.app]);
        }
        if note.timeout_ms > 0 {
            cmd.args(["-t", &note.timeout_ms.to_string()]);
        }
        cmd.args(["-u", note.urgency]).arg(note.message);
        match cmd.status() {
            Ok(status) if !status.success() => warn!("timer: {} exited with {}", program, status),
            Ok(_) => {}
            Err(e) => warn!("timer: {} error: {}", program, e),
        }
    }

    fn reset_alarm_target(&self, clock: &mut Clock) {
        clock.alarm_target = default_alarm_target(Local::now().time(), &self.config);
    }
}

/// Timer/alarm provider.
pub struct TimerProvider {
    shared: Arc<Shared>,
}

impl TimerProvider {
    pub fn new(config: &TimerConfig) -> Self {
        let clock = Clock {
            timer_minutes: i64::from(config.default_minutes),
            timer_stop: None,
            alarm_target: default_alarm_target(Local::now().time(), config),
            alarm_stop: None,
        };
        Self {
            shared: Arc::new(Shared {
                config: config.clone(),
                clock: Mutex::new(clock),
                publisher: Mutex::new(None),
                stop: Shutdown::new(),
            }),
        }
    }

    pub fn state(&self) -> TimerState {
        self.shared.state()
    }

    fn handle_timer(&self, args: &[String]) -> Result<String, ProviderError> {
        let sub = args
            .first()
            .ok_or_else(|| ProviderError::new("timer action required: start, reset, up, down"))?;

        let note = {
            let mut clock = self.shared.clock();
            match sub.as_str() {
                "start" if clock.timer_running() => None,
                "start" => {
                    let token = self.shared.stop.child();
                    clock.timer_stop = Some(token.clone());
                    spawn_countdown(self.shared.clone(), Countdown::Timer, token);
                    Some(Note {
                        app: "attention",
                        message: "timer started",
                        timeout_ms: 3000,
                        urgency: "low",
                    })
                }
                "reset" => {
                    clock.stop_timer();
                    clock.timer_minutes = i64::from(self.shared.config.default_minutes);
                    Some(Note {
                        app: "",
                        message: "timer reset",
                        timeout_ms: 1000,
                        urgency: "low",
                    })
                }
                "up" | "down" => {
                    let minutes = parse_minutes(args.get(1))?;
                    clock.timer_minutes = adjust_timer(clock.timer_minutes, sub == "up", minutes);
                    None
                }
                other => {
                    return Err(ProviderError::new(format!("unknown timer action: {}", other)));
                }
            }
        };

        if let Some(note) = note {
            self.shared.notify(note);
        }
        self.shared.publish();
        Ok(self.shared.state().timer)
    }

    fn handle_alarm(&self, args: &[String]) -> Result<String, ProviderError> {
        let sub = args
            .first()
            .ok_or_else(|| ProviderError::new("alarm action required: start, reset, up, down"))?;

        let note = {
            let mut clock = self.shared.clock();
            match sub.as_str() {
                "start" if clock.alarm_running() => None,
                "start" => {
                    if alarm_remaining(clock.alarm_target, Local::now().time()) == 0 {
                        self.shared.reset_alarm_target(&mut clock);
                        drop(clock);
                        self.shared.publish();
                        return Err(ProviderError::new("alarm time already passed, resetting"));
                    }
                    let token = self.shared.stop.child();
                    clock.alarm_stop = Some(token.clone());
                    spawn_countdown(self.shared.clone(), Countdown::Alarm, token);
                    Some(Note {
                        app: "attention",
                        message: "alarm started",
                        timeout_ms: 3000,
                        urgency: "low",
                    })
                }
                "reset" => {
                    clock.stop_alarm();
                    self.shared.reset_alarm_target(&mut clock);
                    Some(Note {
                        app: "",
                        message: "alarm reset",
                        timeout_ms: 1000,
                        urgency: "low",
                    })
                }
                "up" | "down" => {
                    let minutes = parse_minutes(args.get(1))?;
                    clock.alarm_target = adjust_alarm(clock.alarm_target, sub == "up", minutes);
                    None
                }
                other => {
                    return Err(ProviderError::new(format!("unknown alarm action: {}", other)));
                }
            }
        };

        if let Some(note) = note {
            self.shared.notify(note);
        }
        self.shared.publish();
        Ok(self.shared.state().alarm)
    }
}

impl Provider for TimerProvider {
    fn name(&self) -> &str {
        "timer"
    }

    fn start(&self, shutdown: Shutdown, publisher: Publisher) -> Result<(), ProviderError> {
        shutdown.link(&self.shared.stop);
        *self
            .shared
            .publisher
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(publisher);
        self.shared.publish();

        // Everything else is action-driven.
        self.shared.stop.wait();
        Ok(())
    }

    fn stop(&self) -> Result<(), ProviderError> {
        {
            let mut clock = self.shared.clock();
            clock.stop_timer();
            clock.stop_alarm();
        }
        self.shared.stop.trigger();
        Ok(())
    }

    fn as_action(&self) -> Option<&dyn ActionProvider> {
        Some(self)
    }
}

impl ActionProvider for TimerProvider {
    fn handle_action(&self, args: &[String]) -> Result<String, ProviderError> {
        let group = args.first().ok_or_else(|| {
            ProviderError::new("action required: timer/alarm with start/reset/up/down")
        })?;
        match group.as_str() {
            "timer" => self.handle_timer(&args[1..]),
            "alarm" => self.handle_alarm(&args[1..]),
            other => Err(ProviderError::new(format!(
                "unknown action: {} (use timer or alarm)",
                other
            ))),
        }
    }
}

/// Run one countdown on its own thread until it finishes or `token` fires.
fn spawn_countdown(shared: Arc<Shared>, kind: Countdown, token: Shutdown) {
    let spawned = std::thread::Builder::new()
        .name(format!("timer-{:?}", kind).to_lowercase())
        .spawn(move || countdown_loop(&shared, kind, &token));
    if let Err(e) = spawned {
        warn!("timer: cannot spawn countdown: {}", e);
    }
}

fn countdown_loop(shared: &Shared, kind: Countdown, token: &Shutdown) {
    loop {
        if token.wait_timeout(until_next_minute(&Local::now())) {
            debug!("timer: {:?} countdown stopped", kind);
            return;
        }

        let finished = {
            let mut clock = shared.clock();
            // A reset may have replaced this countdown while we slept.
            if token.is_triggered() {
                return;
            }
            match kind {
                Countdown::Timer => {
                    clock.timer_minutes = (clock.timer_minutes - 1).max(0);
                    if clock.timer_minutes == 0 {
                        clock.timer_stop = None;
                        true
                    } else {
                        false
                    }
                }
                Countdown::Alarm => {
                    if alarm_remaining(clock.alarm_target, Local::now().time()) == 0 {
                        clock.alarm_stop = None;
                        shared.reset_alarm_target(&mut clock);
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if finished {
            let message = match kind {
                Countdown::Timer => "timer done!",
                Countdown::Alarm => "alarm done!",
            };
            shared.notify(Note {
                app: "timer",
                message,
                timeout_ms: 0,
                urgency: "normal",
            });
            shared.publish();
            return;
        }
        shared.publish();
    }
}

fn parse_minutes(arg: Option<&String>) -> Result<i64, ProviderError> {
    let arg = arg.ok_or_else(|| ProviderError::new("up/down requires minutes value"))?;
    arg.parse()
        .map_err(|_| ProviderError::new(format!("invalid minutes: {}", arg)))
}

fn format_hm(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Add or subtract, clamped to `00:00..=99:59`.
fn adjust_timer(current: i64, up: bool, minutes: i64) -> i64 {
    let next = if up { current + minutes } else { current - minutes };
    next.clamp(0, TIMER_MAX_MINUTES)
}

/// Add or subtract, wrapping around midnight.
fn adjust_alarm(current: i64, up: bool, minutes: i64) -> i64 {
    let next = if up { current + minutes } else { current - minutes };
    next.rem_euclid(MINUTES_PER_DAY)
}

/// Whole minutes from `now` until `target` (minutes after midnight), where
/// a target earlier than `now` means tomorrow.
fn alarm_remaining(target: i64, now: NaiveTime) -> i64 {
    let now_secs = i64::from(now.num_seconds_from_midnight());
    let mut target_secs = target * 60;
    if target_secs < now_secs {
        target_secs += MINUTES_PER_DAY * 60;
    }
    (target_secs - now_secs) / 60
}

/// Alarm target after a reset: a whole hour, `default_alarm_hours` from now,
/// or `min_alarm_hours` when less than half of the current hour is left.
fn default_alarm_target(now: NaiveTime, config: &TimerConfig) -> i64 {
    let minutes_left_in_hour = 60 - now.minute();
    let offset = if minutes_left_in_hour < 30 {
        config.min_alarm_hours
    } else {
        config.default_alarm_hours
    };
    i64::from((now.hour() + offset) % 24) * 60
}
