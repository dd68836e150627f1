//! Cell value conversion: dates and amounts

use crate::ingest::workbook::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Days between the spreadsheet epoch (1899-12-30) and the Unix epoch
const UNIX_EPOCH_SERIAL: f64 = 25569.0;
const MS_PER_DAY: f64 = 86_400_000.0;
/// Serial of 9999-12-31
const MAX_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d-%b-%y",
    "%d %b, %Y",
    "%b %d, %Y",
    "%d/%m/%y",
    "%Y/%m/%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M",
];

/// Convert a spreadsheet serial date to an instant
pub fn serial_to_datetime(serial: f64) -> Option<DateTime<Utc>> {
    if !serial.is_finite() || serial <= 0.0 || serial > MAX_SERIAL {
        return None;
    }
    let millis = ((serial - UNIX_EPOCH_SERIAL) * MS_PER_DAY).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse the textual date layouts found in bank exports (day-first)
pub fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    // Serial numbers exported as text
    text.parse::<f64>().ok().and_then(serial_to_datetime)
}

/// Date of a cell, from a date cell, a serial number or text
pub fn cell_date(cell: &Cell) -> Option<DateTime<Utc>> {
    match cell {
        Cell::Date(serial) | Cell::Number(serial) => serial_to_datetime(*serial),
        Cell::Text(text) => parse_date_text(text),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

/// Parse an amount with currency symbols, thousands separators and
/// accounting-style parentheses
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }

    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        negative = true;
        text = inner;
    }

    let upper = text.to_uppercase();
    if upper.ends_with("DR") {
        negative = true;
    }

    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value.abs() } else { value })
}

/// Amount of a cell; anything unparseable counts as zero
pub fn cell_amount(cell: &Cell) -> f64 {
    match cell {
        Cell::Number(n) => *n,
        Cell::Text(text) => parse_amount(text).unwrap_or(0.0),
        _ => 0.0,
    }
}
