//! Date/time fields for the status bar, refreshed on every minute boundary.

use super::until_next_minute;
use crate::config::DateConfig;
use crate::shutdown::Shutdown;
use crate::traits::{Provider, ProviderError, Publisher};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike};
use log::warn;
use serde::Serialize;

const FALLBACK_BIRTH_DATE: &str = "1996-02-26";

/// Clockface emoji for 1 o'clock through 12 o'clock.
const CLOCK_HOURS: [char; 12] = [
    '\u{1F550}', '\u{1F551}', '\u{1F552}', '\u{1F553}', '\u{1F554}', '\u{1F555}',
    '\u{1F556}', '\u{1F557}', '\u{1F558}', '\u{1F559}', '\u{1F55A}', '\u{1F55B}',
];

/// Published value of the `date` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateState {
    pub weekday: String,
    pub weekday_short: String,
    pub month: String,
    pub month_short: String,
    /// Zero-padded day of month.
    pub day: String,
    pub clock_hour: String,
    /// Whole weeks since the configured birth date.
    pub weeks_alive: i64,
}

pub struct DateProvider {
    birth_date: NaiveDate,
    stop: Shutdown,
}

impl DateProvider {
    pub fn new(config: &DateConfig) -> Self {
        let birth_date = parse_date(&config.birth_date).unwrap_or_else(|| {
            warn!("date: invalid birth_date {:?}, using {}", config.birth_date, FALLBACK_BIRTH_DATE);
            parse_date(FALLBACK_BIRTH_DATE).unwrap_or_default()
        });
        Self {
            birth_date,
            stop: Shutdown::new(),
        }
    }

    /// State for the given instant.
    pub fn read_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateState
    where
        Tz::Offset: std::fmt::Display,
    {
        let weeks_alive = (now.date_naive() - self.birth_date).num_days() / 7;
        DateState {
            weekday: now.format("%A").to_string(),
            weekday_short: now.format("%a").to_string(),
            month: now.format("%B").to_string(),
            month_short: now.format("%b").to_string(),
            day: now.format("%d").to_string(),
            clock_hour: clock_hour_icon(now.hour()).to_string(),
            weeks_alive,
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Map a 24-hour hour to its 12-hour clockface.
fn clock_hour_icon(hour: u32) -> char {
    let h = match hour % 12 {
        0 => 12,
        h => h,
    };
    CLOCK_HOURS[(h - 1) as usize]
}

impl Provider for DateProvider {
    fn name(&self) -> &str {
        "date"
    }

    fn start(&self, shutdown: Shutdown, publisher: Publisher) -> Result<(), ProviderError> {
        shutdown.link(&self.stop);

        publisher.publish(&self.read_at(&Local::now()));
        loop {
            if self.stop.wait_timeout(until_next_minute(&Local::now())) {
                return Ok(());
            }
            publisher.publish(&self.read_at(&Local::now()));
        }
    }

    fn stop(&self) -> Result<(), ProviderError> {
        self.stop.trigger();
        Ok(())
    }
}
