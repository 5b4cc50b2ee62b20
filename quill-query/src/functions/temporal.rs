//! Temporal constructors and the `TRUNCATE`/`duration.*` builtins
//! (spec.md §4.2, §4.6), built on top of `quill_api::temporal`'s
//! calendar-aware algebra.

use crate::error::{Error, Result};
use crate::evaluator::{
    current_timestamp_date, current_timestamp_datetime, current_timestamp_time, datetime_from_map,
    duration_from_map, naive_date_from_map, naive_time_from_map, parse_date, parse_datetime, parse_iso_duration,
    parse_time,
};
use chrono::TimeZone;
use quill_api::temporal::{self, TruncateUnit};
use quill_api::value::Duration;
use quill_api::Value;

pub fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name.to_ascii_uppercase().as_str() {
        "DATE" => date_fn(args),
        "DATETIME" | "LOCALDATETIME" => datetime_fn(args),
        "TIME" | "LOCALTIME" => time_fn(args),
        "DURATION" => duration_fn(args),
        "TRUNCATE" => truncate_fn(args),
        "DATE.TRUNCATE" => truncate_fn(args),
        "DATETIME.TRUNCATE" => truncate_fn(args),
        "DURATION.BETWEEN" => duration_between_fn(args),
        "DURATION.INMONTHS" => Ok(Value::Int(temporal::duration_in_months(duration_arg(args, 0)?))),
        "DURATION.INDAYS" => Ok(Value::Int(temporal::duration_in_days(duration_arg(args, 0)?))),
        "DURATION.INSECONDS" => Ok(Value::Int(temporal::duration_in_seconds(duration_arg(args, 0)?))),
        other => Err(Error::UnknownFunction(other.to_string())),
    }
}

fn date_fn(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Date(current_timestamp_date())),
        Some(Value::Null) => Ok(Value::Null),
        Some(Value::Date(d)) => Ok(Value::Date(*d)),
        Some(Value::String(s)) => Ok(Value::Date(parse_date(s)?)),
        Some(Value::Map(m)) => Ok(Value::Date(naive_date_from_map(m)?)),
        Some(other) => Err(arg_err("date", other)),
    }
}

fn datetime_fn(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::DateTime(current_timestamp_datetime())),
        Some(Value::Null) => Ok(Value::Null),
        Some(Value::DateTime(dt)) => Ok(Value::DateTime(*dt)),
        Some(Value::String(s)) => Ok(Value::DateTime(parse_datetime(s)?)),
        Some(Value::Map(m)) => Ok(Value::DateTime(datetime_from_map(m)?)),
        Some(other) => Err(arg_err("datetime", other)),
    }
}

fn time_fn(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Time(current_timestamp_time())),
        Some(Value::Null) => Ok(Value::Null),
        Some(Value::Time(t)) => Ok(Value::Time(*t)),
        Some(Value::String(s)) => Ok(Value::Time(parse_time(s)?)),
        Some(Value::Map(m)) => Ok(Value::Time(naive_time_from_map(m)?)),
        Some(other) => Err(arg_err("time", other)),
    }
}

fn duration_fn(args: &[Value]) -> Result<Value> {
    match args.first() {
        None => Ok(Value::Duration(Duration::ZERO)),
        Some(Value::Null) => Ok(Value::Null),
        Some(Value::Duration(d)) => Ok(Value::Duration(*d)),
        Some(Value::String(s)) => Ok(Value::Duration(parse_iso_duration(s)?)),
        Some(Value::Map(m)) => Ok(Value::Duration(duration_from_map(m)?)),
        Some(other) => Err(arg_err("duration", other)),
    }
}

fn truncate_fn(args: &[Value]) -> Result<Value> {
    let unit_name = match args.first() {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(arg_err("truncate", other)),
        None => return Err(Error::FunctionArgumentType { function: "truncate".to_string(), detail: "missing unit".to_string() }),
    };
    let unit = TruncateUnit::parse(unit_name)
        .ok_or_else(|| Error::InvalidTemporalUnit(unit_name.to_string()))?;
    match args.get(1) {
        Some(Value::Null) | None => Ok(Value::Null),
        Some(Value::Date(d)) => temporal::truncate_date(*d, unit)
            .map(Value::Date)
            .ok_or_else(|| Error::InvalidTemporalUnit(unit_name.to_string())),
        Some(Value::Time(t)) => Ok(Value::Time(temporal::truncate_time(*t, unit))),
        Some(Value::DateTime(dt)) => {
            let date = temporal::truncate_date(dt.date_naive(), unit)
                .ok_or_else(|| Error::InvalidTemporalUnit(unit_name.to_string()))?;
            let time = temporal::truncate_time(dt.time(), unit);
            dt.timezone()
                .from_local_datetime(&date.and_time(time))
                .single()
                .map(Value::DateTime)
                .ok_or_else(|| Error::TimezoneResolution("ambiguous local time after truncation".to_string()))
        }
        Some(other) => Err(arg_err("truncate", other)),
    }
}

fn duration_between_fn(args: &[Value]) -> Result<Value> {
    match (args.first(), args.get(1)) {
        (Some(Value::Null), _) | (_, Some(Value::Null)) => Ok(Value::Null),
        (Some(Value::Date(a)), Some(Value::Date(b))) => {
            Ok(Value::Duration(temporal::duration_between_dates(*a, *b)))
        }
        (Some(Value::DateTime(a)), Some(Value::DateTime(b))) => {
            Ok(Value::Duration(temporal::duration_between_datetimes(*a, *b)))
        }
        _ => Err(Error::FunctionArgumentType {
            function: "duration.between".to_string(),
            detail: "expected two dates or two datetimes".to_string(),
        }),
    }
}

fn duration_arg(args: &[Value], index: usize) -> Result<&Duration> {
    match args.get(index) {
        Some(Value::Duration(d)) => Ok(d),
        Some(other) => Err(arg_err("duration", other)),
        None => Err(Error::FunctionArgumentType { function: "duration".to_string(), detail: "missing argument".to_string() }),
    }
}

fn arg_err(function: &str, v: &Value) -> Error {
    Error::FunctionArgumentType { function: function.to_string(), detail: format!("unexpected argument type {}", v.type_name()) }
}
