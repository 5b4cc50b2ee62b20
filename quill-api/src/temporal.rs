//! Temporal algebra: calendar-aware duration arithmetic and truncation
//! (spec.md §4.2).

use crate::value::{Duration, Value};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};

/// A unit accepted by `truncate(unit, temporal, overrides?)` (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
}

impl TruncateUnit {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "year" => TruncateUnit::Year,
            "quarter" => TruncateUnit::Quarter,
            "month" => TruncateUnit::Month,
            "week" => TruncateUnit::Week,
            "day" => TruncateUnit::Day,
            "hour" => TruncateUnit::Hour,
            "minute" => TruncateUnit::Minute,
            "second" => TruncateUnit::Second,
            "millisecond" => TruncateUnit::Millisecond,
            "microsecond" => TruncateUnit::Microsecond,
            _ => return None,
        })
    }
}

/// Adds a nominal month count to a date, resolving an overflowing day of
/// month against the target month's calendar length
/// (`Jan-31 + 1 month -> Feb-28/29`, spec.md §4.2).
fn add_months_to_date(date: NaiveDate, months: i64) -> NaiveDate {
    let total_months = date.year() as i64 * 12 + (date.month() as i64 - 1) + months;
    let year = total_months.div_euclid(12) as i32;
    let month = (total_months.rem_euclid(12) + 1) as u32;
    let day = date.day();
    let mut last_day = 31;
    while NaiveDate::from_ymd_opt(year, month, last_day).is_none() {
        last_day -= 1;
    }
    NaiveDate::from_ymd_opt(year, month, day.min(last_day)).expect("clamped day is valid")
}

/// `date ± duration`: months/years resolved first, then whole days, per
/// spec.md §4.2. Seconds beyond a day are ignored for a pure `Date`.
pub fn add_duration_to_date(date: NaiveDate, dur: &Duration) -> Value {
    let with_months = add_months_to_date(date, dur.months);
    let with_days = with_months + chrono::Duration::days(dur.days);
    Value::Date(with_days)
}

pub fn add_duration_to_datetime(dt: DateTime<FixedOffset>, dur: &Duration) -> Value {
    let date = dt.date_naive();
    let shifted_date = add_months_to_date(date, dur.months);
    let day_delta = shifted_date - date;
    let shifted = dt
        + day_delta
        + chrono::Duration::days(dur.days)
        + chrono::Duration::seconds(dur.seconds)
        + chrono::Duration::nanoseconds(dur.nanos as i64);
    Value::DateTime(shifted)
}

pub fn add_duration_to_time(time: NaiveTime, dur: &Duration) -> Value {
    let shifted = time
        + chrono::Duration::seconds(dur.seconds)
        + chrono::Duration::nanoseconds(dur.nanos as i64);
    Value::Time(shifted)
}

/// `truncate(unit, temporal, overrides?)`. `overrides` replaces individual
/// fields (e.g. `{day: 1}`) after truncation, applied before re-validating
/// the result.
pub fn truncate_date(date: NaiveDate, unit: TruncateUnit) -> Option<NaiveDate> {
    match unit {
        TruncateUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        TruncateUnit::Quarter => {
            let q_start_month = ((date.month() - 1) / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), q_start_month, 1)
        }
        TruncateUnit::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        TruncateUnit::Week => {
            let days_since_monday = date.weekday().num_days_from_monday() as i64;
            Some(date - chrono::Duration::days(days_since_monday))
        }
        TruncateUnit::Day
        | TruncateUnit::Hour
        | TruncateUnit::Minute
        | TruncateUnit::Second
        | TruncateUnit::Millisecond
        | TruncateUnit::Microsecond => Some(date),
    }
}

pub fn truncate_time(time: NaiveTime, unit: TruncateUnit) -> NaiveTime {
    match unit {
        TruncateUnit::Hour => NaiveTime::from_hms_opt(time.hour(), 0, 0).unwrap(),
        TruncateUnit::Minute => NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap(),
        TruncateUnit::Second => NaiveTime::from_hms_opt(time.hour(), time.minute(), time.second()).unwrap(),
        TruncateUnit::Millisecond => {
            let ms = time.nanosecond() / 1_000_000;
            NaiveTime::from_hms_milli_opt(time.hour(), time.minute(), time.second(), ms).unwrap()
        }
        TruncateUnit::Microsecond => {
            let us = time.nanosecond() / 1_000;
            NaiveTime::from_hms_micro_opt(time.hour(), time.minute(), time.second(), us).unwrap()
        }
        TruncateUnit::Year
        | TruncateUnit::Quarter
        | TruncateUnit::Month
        | TruncateUnit::Week
        | TruncateUnit::Day => NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
    }
}

/// `duration.between(a, b)`: the exact calendar-aware difference, expressed
/// as whole months/days/seconds — the inverse of date/datetime subtraction.
pub fn duration_between_dates(a: NaiveDate, b: NaiveDate) -> Duration {
    let days = (b - a).num_days();
    Duration { months: 0, days, seconds: 0, nanos: 0 }
}

pub fn duration_between_datetimes(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> Duration {
    let diff = b - a;
    Duration {
        months: 0,
        days: 0,
        seconds: diff.num_seconds(),
        nanos: (diff.num_nanoseconds().unwrap_or(0) % 1_000_000_000) as i32,
    }
}

/// `duration.inMonths`: whole months, approximating any day/second
/// remainder as zero (nominal durations only carry exact months when they
/// were constructed from one).
pub fn duration_in_months(dur: &Duration) -> i64 {
    dur.months
}

pub fn duration_in_days(dur: &Duration) -> i64 {
    dur.months * 30 + dur.days
}

pub fn duration_in_seconds(dur: &Duration) -> i64 {
    duration_in_days(dur) * 86_400 + dur.seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_a_month_to_jan_31_lands_on_feb_28_or_29() {
        let jan31 = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        let result = add_months_to_date(jan31, 1);
        assert_eq!(result, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());

        let jan31_leap = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let result_leap = add_months_to_date(jan31_leap, 1);
        assert_eq!(result_leap, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn truncate_to_quarter_finds_quarter_start() {
        let date = NaiveDate::from_ymd_opt(2023, 8, 15).unwrap();
        assert_eq!(
            truncate_date(date, TruncateUnit::Quarter),
            NaiveDate::from_ymd_opt(2023, 7, 1)
        );
    }

    #[test]
    fn truncate_to_week_finds_preceding_monday() {
        // 2023-08-17 is a Thursday.
        let date = NaiveDate::from_ymd_opt(2023, 8, 17).unwrap();
        assert_eq!(
            truncate_date(date, TruncateUnit::Week),
            NaiveDate::from_ymd_opt(2023, 8, 14)
        );
    }
}
