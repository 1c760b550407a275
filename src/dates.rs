//! Calendar helpers shared by the schedule generator and availability search
//!
//! All arithmetic here operates on calendar dates (`NaiveDate`), never on
//! instants, so a range crossing a daylight-saving change still yields one
//! entry per day shown on the admin's calendar.

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Every calendar day from `start` to `end`, both inclusive.
///
/// Returns an empty vector when `start > end`; callers that require a
/// non-empty range validate before calling.
pub fn enumerate_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Current calendar date in the given timezone
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Parse a required `YYYY-MM-DD` field
pub fn parse_date(value: Option<&str>, field: &str) -> AppResult<NaiveDate> {
    let raw = required(value, field)?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| AppError::Validation(format!("Invalid {} (use YYYY-MM-DD)", field)))
}

/// Parse a required `HH:MM` field
pub fn parse_time(value: Option<&str>, field: &str) -> AppResult<NaiveTime> {
    let raw = required(value, field)?;
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| AppError::Validation(format!("Invalid {} (use HH:MM)", field)))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

/// Document key of an individual schedule: `{visit_type}_{date}_{time}`
pub fn individual_key(visit_type: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "{}_{}_{}",
        visit_type,
        date.format(DATE_FORMAT),
        time.format(TIME_FORMAT)
    )
}

/// Document key of one day of a bulk schedule: `{visit_type}_{date}_{start}-{end}`
pub fn bulk_key(visit_type: &str, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> String {
    format!(
        "{}_{}_{}-{}",
        visit_type,
        date.format(DATE_FORMAT),
        start.format(TIME_FORMAT),
        end.format(TIME_FORMAT)
    )
}

/// Serde adapter writing `NaiveTime` as `HH:MM`
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, super::TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
