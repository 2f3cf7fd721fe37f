//! Date helpers
//!
//! Dates are naive (no time zone). Months are 1-based, `dayofweek` counts
//! from Sunday = 0.

use super::{arg, builtin, date, int, text, Builtin};
use aggtree_core::{Value, DATE_FORMAT};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt::Write;

const CATEGORY: &str = "date";

fn with_date(args: &[Value], f: fn(&NaiveDateTime) -> f64) -> Value {
    match date(args, 0) {
        Some(d) => Value::Number(f(&d)),
        None => Value::Null,
    }
}

fn now(_args: &[Value]) -> Value {
    Value::Date(Utc::now().naive_utc())
}

fn datetime(args: &[Value]) -> Value {
    let part = |i: usize, default: i64| match args.get(i) {
        None | Some(Value::Null) => Some(default),
        Some(_) => int(args, i),
    };
    let built = (|| {
        let year = i32::try_from(part(0, 1970)?).ok()?;
        let month = u32::try_from(part(1, 1)?).ok()?;
        let day = u32::try_from(part(2, 1)?).ok()?;
        let hours = u32::try_from(part(3, 0)?).ok()?;
        let minutes = u32::try_from(part(4, 0)?).ok()?;
        let seconds = u32::try_from(part(5, 0)?).ok()?;
        let millis = u32::try_from(part(6, 0)?).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_milli_opt(hours, minutes, seconds, millis)
    })();
    built.map(Value::Date).unwrap_or(Value::Null)
}

fn parse_date(args: &[Value]) -> Value {
    let s = text(args, 0);
    let parsed = match args.get(1) {
        None | Some(Value::Null) => arg(args, 0).to_date(),
        Some(fmt) => {
            let fmt = fmt.to_text();
            NaiveDateTime::parse_from_str(s.trim(), &fmt).ok().or_else(|| {
                NaiveDate::parse_from_str(s.trim(), &fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        }
    };
    parsed.map(Value::Date).unwrap_or(Value::Null)
}

fn format_date(args: &[Value]) -> Value {
    let Some(d) = date(args, 0) else {
        return Value::Null;
    };
    let fmt = match args.get(1) {
        None | Some(Value::Null) => DATE_FORMAT.to_string(),
        Some(v) => v.to_text(),
    };
    // An invalid format specifier surfaces as a fmt::Error, not a panic
    let mut out = String::new();
    match write!(out, "{}", d.format(&fmt)) {
        Ok(()) => Value::Text(out),
        Err(_) => Value::Null,
    }
}

fn add_days(args: &[Value]) -> Value {
    let (Some(d), Some(days)) = (date(args, 0), int(args, 1)) else {
        return Value::Null;
    };
    Duration::try_days(days)
        .and_then(|delta| d.checked_add_signed(delta))
        .map(Value::Date)
        .unwrap_or(Value::Null)
}

fn days_between(args: &[Value]) -> Value {
    match (date(args, 0), date(args, 1)) {
        (Some(from), Some(to)) => Value::Number((to - from).num_days() as f64),
        _ => Value::Null,
    }
}

pub static DATE_FUNCTIONS: &[Builtin] = &[
    builtin!(CATEGORY, "add_days", [2], "add_days(d, days)", "Shift a date by a number of days", add_days),
    builtin!(CATEGORY, "date", [1], "date(d)", "Day of the month (1-31)", |a| with_date(a, |d| d.day() as f64)),
    builtin!(CATEGORY, "datetime", [1, 2, 3, 4, 5, 6, 7], "datetime(year, month?, day?, hours?, minutes?, seconds?, ms?)", "Build a date from its parts", datetime),
    builtin!(CATEGORY, "dayofweek", [1], "dayofweek(d)", "Day of the week, Sunday = 0", |a| with_date(a, |d| d.weekday().num_days_from_sunday() as f64)),
    builtin!(CATEGORY, "dayofyear", [1], "dayofyear(d)", "Day of the year (1-366)", |a| with_date(a, |d| d.ordinal() as f64)),
    builtin!(CATEGORY, "days_between", [2], "days_between(from, to)", "Whole days from one date to another", days_between),
    builtin!(CATEGORY, "format_date", [1, 2], "format_date(d, format?)", "Render a date with a strftime format", format_date),
    builtin!(CATEGORY, "hours", [1], "hours(d)", "Hour of the day (0-23)", |a| with_date(a, |d| d.hour() as f64)),
    builtin!(CATEGORY, "milliseconds", [1], "milliseconds(d)", "Millisecond of the second", |a| with_date(a, |d| (d.nanosecond() / 1_000_000) as f64)),
    builtin!(CATEGORY, "minutes", [1], "minutes(d)", "Minute of the hour", |a| with_date(a, |d| d.minute() as f64)),
    builtin!(CATEGORY, "month", [1], "month(d)", "Month of the year (1-12)", |a| with_date(a, |d| d.month() as f64)),
    builtin!(CATEGORY, "now", [0], "now()", "Current date and time (UTC)", now),
    builtin!(CATEGORY, "parse_date", [1, 2], "parse_date(s, format?)", "Parse text into a date", parse_date),
    builtin!(CATEGORY, "quarter", [1], "quarter(d)", "Quarter of the year (1-4)", |a| with_date(a, |d| ((d.month() - 1) / 3 + 1) as f64)),
    builtin!(CATEGORY, "seconds", [1], "seconds(d)", "Second of the minute", |a| with_date(a, |d| d.second() as f64)),
    builtin!(CATEGORY, "timestamp", [1], "timestamp(d)", "Milliseconds since the Unix epoch", |a| with_date(a, |d| d.and_utc().timestamp_millis() as f64)),
    builtin!(CATEGORY, "week", [1], "week(d)", "ISO week number", |a| with_date(a, |d| d.iso_week().week() as f64)),
    builtin!(CATEGORY, "year", [1], "year(d)", "Calendar year", |a| with_date(a, |d| d.year() as f64)),
];
