//! Typed readings of raw cells.
//!
//! Source extracts are noisy: amounts arrive with thousands separators or a
//! stray `%`, blanks arrive as `nan`/`None`, and dates arrive either as a
//! spreadsheet serial day count or as free calendar text. Every function in
//! this module is total: anything that cannot be read yields `None` instead
//! of an error, so a bad cell can never abort a merge.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::cell::{Cell, format_number};

const SENTINEL_TOKENS: &[&str] = &["nan", "none", "null"];

/// Serial values at or below this bound are treated as counts or short codes.
const SERIAL_LOWER_EXCLUSIVE: f64 = 59.0;
const SERIAL_UPPER_EXCLUSIVE: f64 = 90_000.0;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

// Month-first wins whenever both readings are valid.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

fn is_sentinel(trimmed: &str) -> bool {
    SENTINEL_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

pub fn normalize_number(cell: &Cell) -> Option<f64> {
    let parsed = match cell {
        Cell::Empty | Cell::Date(_) => return None,
        Cell::Number(n) => *n,
        Cell::Text(raw) => {
            let stripped = raw.replace(['%', ','], "");
            let trimmed = stripped.trim();
            if trimmed.is_empty() || is_sentinel(trimmed) {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
    };
    parsed.is_finite().then_some(parsed)
}

pub fn normalize_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || is_sentinel(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Cell::Number(n) if n.is_finite() => Some(format_number(*n)),
        Cell::Number(_) => None,
        Cell::Date(_) => Some(cell.display()),
    }
}

pub fn is_empty(cell: &Cell) -> bool {
    normalize_text(cell).is_none()
}

pub fn normalize_date(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::Empty => None,
        Cell::Date(dt) => within_window(*dt),
        Cell::Number(n) => serial_in_range(*n).and_then(excel_serial_to_datetime),
        Cell::Text(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || is_sentinel(trimmed) {
                return None;
            }
            if let Ok(n) = trimmed.parse::<f64>()
                && let Some(serial) = serial_in_range(n)
            {
                return excel_serial_to_datetime(serial);
            }
            parse_calendar_text(trimmed).and_then(within_window)
        }
    }
}

fn serial_in_range(value: f64) -> Option<f64> {
    (value > SERIAL_LOWER_EXCLUSIVE && value < SERIAL_UPPER_EXCLUSIVE).then_some(value)
}

/// Converts a spreadsheet serial day count (epoch 1899-12-30, fractional
/// part = time of day) into a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() > 3_000_000.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let converted = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    within_window(converted)
}

fn parse_calendar_text(value: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.naive_local())
}

fn within_window(value: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = NaiveDate::from_ymd_opt(1753, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let upper = NaiveDate::from_ymd_opt(9999, 12, 31)?.and_hms_opt(23, 59, 59)?;
    (value >= lower && value <= upper).then_some(value)
}

/// Canonical form used for every column lookup: BOM and whitespace removed,
/// upper-cased.
pub fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
