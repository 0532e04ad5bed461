//! Weekly file naming.
//!
//! The live file is keyed by the ISO 8601 (year, week) of "now". The time
//! source is a [`Clock`] so handlers and tests can pin the week.

use chrono::{DateTime, Datelike, Local, TimeZone};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn from_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let iso = now.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

/// `"{prefix}_{iso_year}-W{iso_week}.xlsx"`, week not zero-padded.
pub fn weekly_file_name<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String {
    let key = WeekKey::from_datetime(now);
    format!("{prefix}_{}-W{}.xlsx", key.year, key.week)
}
