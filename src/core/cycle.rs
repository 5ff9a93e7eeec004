//! Target cycle calculation.
//!
//! Pure date arithmetic that turns an entity's cycle configuration into
//! concrete periods. Reset instants fall on midnight UTC. A period is the
//! half-open range `[start, end)`; `end` doubles as the next reset instant, so
//! a timestamp exactly on a boundary always belongs to the newer period.
//!
//! Reset days beyond the length of a month are clamped to that month's last
//! day. The clamp is recomputed from the configured day for every month, so a
//! `reset_day` of 31 yields Jan 31, Feb 28 (or 29), Mar 31 and never drifts
//! or skips a month.
//!
//! Yearly cycles are anchored on a calendar date, `reset_month` plus a
//! `reset_day` of 1-31, rather than a day-of-year of 1-366. A day-of-year
//! would land on a different date in leap years; the month/day pair does not,
//! and Feb 29 clamps to Feb 28 in common years like any other overlong day.

use crate::errors::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often an entity's target period recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    /// A new period starts every month on the reset day
    Monthly,
    /// A new period starts once a year on the reset month and day
    Yearly,
}

impl CycleType {
    /// Storage representation, as kept in the `target_cycle` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(Error::InvalidCycle {
                message: format!("unknown cycle type '{other}'"),
            }),
        }
    }
}

/// A validated cycle configuration.
///
/// Construct through [`CycleConfig::new`]; the calculator relies on the
/// ranges checked there and never fails afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    cycle_type: CycleType,
    reset_day: u32,
    reset_month: Option<u32>,
}

impl CycleConfig {
    /// Validates a cycle configuration at the admin-edit boundary.
    ///
    /// `reset_day` must be within 1-31. Yearly cycles require `reset_month`
    /// within 1-12; for monthly cycles any supplied month is dropped.
    pub fn new(cycle_type: CycleType, reset_day: i32, reset_month: Option<i32>) -> Result<Self> {
        let reset_day = u32::try_from(reset_day)
            .ok()
            .filter(|day| (1..=31).contains(day))
            .ok_or_else(|| Error::InvalidCycle {
                message: format!("reset day {reset_day} is outside 1-31"),
            })?;

        let reset_month = match cycle_type {
            CycleType::Monthly => None,
            CycleType::Yearly => {
                let month = reset_month.ok_or_else(|| Error::InvalidCycle {
                    message: "yearly cycles require a reset month".to_string(),
                })?;
                let month = u32::try_from(month)
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| Error::InvalidCycle {
                        message: format!("reset month {month} is outside 1-12"),
                    })?;
                Some(month)
            }
        };

        Ok(Self {
            cycle_type,
            reset_day,
            reset_month,
        })
    }

    /// Shorthand for a monthly cycle.
    pub fn monthly(reset_day: i32) -> Result<Self> {
        Self::new(CycleType::Monthly, reset_day, None)
    }

    /// Shorthand for a yearly cycle.
    pub fn yearly(reset_month: i32, reset_day: i32) -> Result<Self> {
        Self::new(CycleType::Yearly, reset_day, Some(reset_month))
    }

    /// Parses the stored column values of an agent or team.
    pub fn from_columns(
        target_cycle: &str,
        reset_day: i32,
        reset_month: Option<i32>,
    ) -> Result<Self> {
        Self::new(target_cycle.parse()?, reset_day, reset_month)
    }

    #[must_use]
    pub const fn cycle_type(&self) -> CycleType {
        self.cycle_type
    }

    #[must_use]
    pub const fn reset_day(&self) -> u32 {
        self.reset_day
    }

    #[must_use]
    pub const fn reset_month(&self) -> Option<u32> {
        self.reset_month
    }
}

/// One concrete occurrence of a cycle: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl Period {
    /// The instant at which this period is over and the next one begins.
    #[must_use]
    pub const fn next_reset(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `instant` falls inside the half-open range.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Computes the period containing `now` for the given configuration.
#[must_use]
pub fn compute_current_period(config: &CycleConfig, now: DateTime<Utc>) -> Period {
    match (config.cycle_type, config.reset_month) {
        (CycleType::Yearly, Some(month)) => yearly_period(month, config.reset_day, now),
        // Validation guarantees yearly configs carry a month
        _ => monthly_period(config.reset_day, now),
    }
}

/// Returns the period that begins exactly at `boundary`.
///
/// Used to advance an entity after closing `[.., boundary)`. The start is
/// pinned to `boundary` so consecutive periods stay contiguous even if the
/// stored boundary was produced by an older configuration.
#[must_use]
pub fn next_period(config: &CycleConfig, boundary: DateTime<Utc>) -> Period {
    let containing = compute_current_period(config, boundary);
    Period {
        start: boundary,
        end: containing.end,
    }
}

fn monthly_period(reset_day: u32, now: DateTime<Utc>) -> Period {
    let this_month = reset_instant(now.year(), now.month(), reset_day);
    let start = if now >= this_month {
        this_month
    } else {
        let (year, month) = previous_month(now.year(), now.month());
        reset_instant(year, month, reset_day)
    };
    let (year, month) = following_month(start.year(), start.month());
    Period {
        start,
        end: reset_instant(year, month, reset_day),
    }
}

fn yearly_period(reset_month: u32, reset_day: u32, now: DateTime<Utc>) -> Period {
    let this_year = reset_instant(now.year(), reset_month, reset_day);
    let start = if now >= this_year {
        this_year
    } else {
        reset_instant(now.year() - 1, reset_month, reset_day)
    };
    Period {
        start,
        end: reset_instant(start.year() + 1, reset_month, reset_day),
    }
}

/// Midnight UTC on `reset_day` of the given month, clamped to the month's last day.
fn reset_instant(year: i32, month: u32, reset_day: u32) -> DateTime<Utc> {
    let day = reset_day.min(days_in_month(year, month));
    // Month is always 1-12 and day is clamped, so this only fails outside chrono's year range
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MIN_UTC, |midnight| midnight.and_utc())
}

/// Number of days in the given month.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = following_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

const fn following_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

const fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}
