//! Pure date and money arithmetic shared by renewal pricing, termination
//! refunds, and GIRO amount computation. No state, no I/O.

use chrono::{Datelike, Duration, NaiveDate};

use crate::errors::{EngineError, Result};

/// Contractual billing convention: every month is flat 30 days for
/// proration, regardless of the calendar month. Renewals and refunds must
/// agree on this constant.
pub const PRORATION_DAYS_PER_MONTH: f64 = 30.0;

/// Adds `months` calendar months to `date`, then steps back one day. Used to
/// turn an exclusive period end into an inclusive `valid_to`: one month from
/// Jan 1 is Jan 31, one month from Feb 1 of a leap year is Feb 29.
pub fn add_months_rollback(date: NaiveDate, months: u32) -> NaiveDate {
    shift_months(date, months as i32) - Duration::days(1)
}

/// Daily rate derived from the monthly rate under the flat-30-day rule.
pub fn daily_rate(monthly_rate: f64) -> f64 {
    monthly_rate / PRORATION_DAYS_PER_MONTH
}

/// Number of days in the inclusive range `[from, to]`. At least 1 for any
/// valid range; `from == to` counts as a single day.
pub fn inclusive_day_count(from: NaiveDate, to: NaiveDate) -> Result<i64> {
    if to < from {
        return Err(EngineError::InvalidRange { from, to });
    }
    Ok((to - from).num_days() + 1)
}

/// Charge or refund for the inclusive range `[from, to]` at the given
/// monthly rate: daily rate times day count, rounded to currency precision
/// and never below zero.
pub fn prorated_amount(monthly_rate: f64, from: NaiveDate, to: NaiveDate) -> Result<f64> {
    let days = inclusive_day_count(from, to)?;
    let amount = daily_rate(monthly_rate) * days as f64;
    Ok(round_currency(amount.max(0.0)))
}

/// Rounds to two-decimal currency precision, half away from zero.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;
    let mut day = date.day();
    while month > 12 {
        month -= 12;
        year += 1;
    }
    while month < 1 {
        month += 12;
        year -= 1;
    }
    day = day.min(days_in_month(year, month as u32));
    NaiveDate::from_ymd_opt(year, month as u32, day).unwrap()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };
    let first_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 28).unwrap());
    let last_current = first_next - Duration::days(1);
    last_current.day()
}
