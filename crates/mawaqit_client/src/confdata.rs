//! Extraction of the `confData` object embedded in a mawaqit masjid page.
//!
//! The page assigns a large JSON object to a JS variable. Only two fields
//! matter here: `timezone` and `calendar`, the latter being twelve month
//! tables that map day-of-month (as a string) to the day's clock times.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use common::{Error, PrayerTimes};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::compose::{compose, resolve_zone};

const MARKER_PATTERN: &str = r"var\s+confData\s*=\s*";
const CLOCK_FORMAT: &str = "%H:%M";

/// The subset of `confData` we rely on.
///
/// Both fields stay untyped: only the requested day is checked, so a bad
/// cell elsewhere in the calendar does not break every lookup.
#[derive(Debug, Deserialize)]
pub struct ConfData {
    #[serde(default)]
    pub timezone: Option<Value>,
    #[serde(default)]
    pub calendar: Option<Value>,
}

impl ConfData {
    /// Non-empty IANA zone name, if present.
    pub fn timezone_name(&self) -> Option<&str> {
        self.timezone
            .as_ref()
            .and_then(Value::as_str)
            .filter(|tz| !tz.trim().is_empty())
    }
}

fn marker() -> Result<&'static Regex, Error> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = MARKER.get() {
        return Ok(re);
    }
    let re = Regex::new(MARKER_PATTERN)
        .map_err(|e| Error::Config(format!("confData marker pattern: {e}")))?;
    Ok(MARKER.get_or_init(|| re))
}

/// Locate `var confData = ` and decode exactly one JSON object after it.
pub fn extract_conf_data(masjid_id: &str, html: &str) -> Result<ConfData, Error> {
    let found = marker()?
        .find(html)
        .ok_or_else(|| Error::parse(masjid_id, "failed to extract confData"))?;

    let rest = &html[found.end()..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<ConfData>();
    match stream.next() {
        Some(Ok(conf)) => Ok(conf),
        Some(Err(e)) => Err(Error::parse(
            masjid_id,
            format!("failed to parse confData JSON: {e}"),
        )),
        None => Err(Error::parse(masjid_id, "failed to extract confData")),
    }
}

/// Build the record for one day of `conf`.
pub fn prayer_times_for_day(
    masjid_id: &str,
    conf: &ConfData,
    year: i32,
    month: u32,
    day: u32,
) -> Result<PrayerTimes, Error> {
    let tz_name = conf
        .timezone_name()
        .ok_or_else(|| Error::parse(masjid_id, "timezone not found in confData"))?;

    let calendar = match conf.calendar.as_ref() {
        Some(Value::Array(months)) if months.len() == 12 => months,
        Some(Value::Array(months)) => {
            return Err(Error::parse(
                masjid_id,
                format!(
                    "invalid calendar structure: expected 12 months, got {}",
                    months.len()
                ),
            ))
        }
        Some(_) => {
            return Err(Error::parse(
                masjid_id,
                "invalid calendar structure: calendar is not a list",
            ))
        }
        None => {
            return Err(Error::parse(
                masjid_id,
                "invalid calendar structure: calendar missing",
            ))
        }
    };

    if !(1..=12).contains(&month) {
        return Err(Error::parse(masjid_id, format!("invalid month: {month}")));
    }

    let entries = calendar[(month - 1) as usize]
        .as_object()
        .and_then(|table| table.get(&day.to_string()))
        .and_then(Value::as_array)
        .filter(|entries| entries.len() >= 6)
        .ok_or_else(|| Error::parse(masjid_id, format!("day {day} not found in month {month}")))?;

    let mut clocks = [NaiveTime::MIN; 6];
    for (i, entry) in entries.iter().enumerate() {
        let Some(raw) = entry.as_str() else {
            return Err(Error::parse(
                masjid_id,
                format!("invalid time format at index {i}"),
            ));
        };
        if let Some(slot) = clocks.get_mut(i) {
            *slot = NaiveTime::parse_from_str(raw.trim(), CLOCK_FORMAT)
                .map_err(|_| Error::parse(masjid_id, format!("invalid time format: {raw}")))?;
        }
    }

    let zone = resolve_zone(tz_name)
        .ok_or_else(|| Error::parse(masjid_id, format!("invalid timezone: {tz_name}")))?;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::parse(
            masjid_id,
            format!("day {day} does not exist in month {month} of {year}"),
        )
    })?;

    let record = PrayerTimes::from_ordered(clocks.map(|c| compose(date, c, zone)), tz_name);
    if !record.is_ordered() {
        warn!(
            "Prayer times for {} on {}-{:02}-{:02} are not in ascending order",
            masjid_id, year, month, day
        );
    }

    Ok(record)
}
