//! Calendar-aware delays until the next firing of a cadence.
//!
//! Every computation starts from the wall clock at call time. There is no
//! persisted anchor, so a late firing shifts every later boundary with it.

use crate::error::{BillingError, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl CadenceUnit {
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            CadenceUnit::Seconds | CadenceUnit::Days | CadenceUnit::Months
        )
    }
}

impl fmt::Display for CadenceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CadenceUnit::Seconds => "seconds",
            CadenceUnit::Minutes => "minutes",
            CadenceUnit::Hours => "hours",
            CadenceUnit::Days => "days",
            CadenceUnit::Weeks => "weeks",
            CadenceUnit::Months => "months",
            CadenceUnit::Years => "years",
        };
        f.write_str(name)
    }
}

impl FromStr for CadenceUnit {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let unit = s.trim().to_ascii_lowercase();
        match unit.trim_end_matches('s') {
            "second" => Ok(CadenceUnit::Seconds),
            "minute" => Ok(CadenceUnit::Minutes),
            "hour" => Ok(CadenceUnit::Hours),
            "day" => Ok(CadenceUnit::Days),
            "week" => Ok(CadenceUnit::Weeks),
            "month" => Ok(CadenceUnit::Months),
            "year" => Ok(CadenceUnit::Years),
            _ => Err(BillingError::Validation(format!("unknown cadence unit '{}'", s))),
        }
    }
}

/// Delay from now until the next occurrence of `quantity` x `unit`.
///
/// * `Months`: 00:00:00 on day 1 of the month `quantity` months after the current one.
/// * `Days`: 00:00:00 of the day `quantity` days from today.
/// * `Seconds`: `quantity` seconds after now, truncated to the whole second.
///
/// Other units fail with `BillingError::UnsupportedCadence`. Targets already in
/// the past give a zero delay.
pub fn delay_to_next(unit: CadenceUnit, quantity: u32) -> Result<Duration> {
    let now = Local::now();
    let target = next_occurrence(&now, unit, quantity)?;
    Ok(delay_between(&now, &target))
}

/// The instant a cadence next fires, measured from `now`.
pub fn next_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    unit: CadenceUnit,
    quantity: u32,
) -> Result<DateTime<Tz>> {
    match unit {
        CadenceUnit::Seconds => {
            let truncated = now
                .clone()
                .with_nanosecond(0)
                .ok_or(BillingError::CadenceOutOfRange)?;
            truncated
                .checked_add_signed(TimeDelta::seconds(i64::from(quantity)))
                .ok_or(BillingError::CadenceOutOfRange)
        }
        CadenceUnit::Days => {
            let day = now
                .date_naive()
                .checked_add_days(chrono::Days::new(u64::from(quantity)))
                .ok_or(BillingError::CadenceOutOfRange)?;
            start_of_day(&now.timezone(), day)
        }
        CadenceUnit::Months => {
            let first = now
                .date_naive()
                .with_day(1)
                .and_then(|d| d.checked_add_months(chrono::Months::new(quantity)))
                .ok_or(BillingError::CadenceOutOfRange)?;
            start_of_day(&now.timezone(), first)
        }
        other => Err(BillingError::UnsupportedCadence(other.to_string())),
    }
}

pub fn delay_between<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>) -> Duration {
    target
        .clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

// A midnight skipped by a DST transition resolves to the first hour after it.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Result<DateTime<Tz>> {
    let midnight = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .ok_or(BillingError::CadenceOutOfRange)
}
