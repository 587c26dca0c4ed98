//! Date handling between the wire format and form values.
//!
//! The backend always exchanges dates as `YYYY-MM-DD`, datetimes as
//! `YYYY-MM-DD HH:MM:SS` and times as `HH:MM:SS`. Forms hold typed chrono
//! values instead, and display strings follow descriptor `format` patterns
//! written with moment-style tokens (`DD-MM-YYYY`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

use crate::field::DataType;
use crate::structure::Structure;
use crate::types::Row;

pub const WIRE_DATE: &str = "%Y-%m-%d";
pub const WIRE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";
pub const WIRE_TIME: &str = "%H:%M:%S";

pub const DEFAULT_DATE_FORMAT: &str = "DD-MM-YYYY";
pub const DEFAULT_TIME_FORMAT: &str = "HH:mm:ss";
pub const DEFAULT_DATETIME_FORMAT: &str = "DD-MM-YYYY HH:mm";

// ---------------------------------------------------------------------------
// Parsing and display
// ---------------------------------------------------------------------------

/// Strict `YYYY-MM-DD` parse: exactly ten characters, zero-padded.
#[must_use]
pub fn parse_wire_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(text, WIRE_DATE).ok()
}

/// Parses `YYYY-MM-DD HH:MM:SS`, also accepting a `T` separator and
/// fractional seconds.
#[must_use]
pub fn parse_wire_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[must_use]
pub fn parse_wire_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, WIRE_TIME)
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// Grid rendering of a wire date: `2024-03-05` becomes `05-03-2024`.
///
/// Datetimes are cut to their date part. Anything that is not a valid date
/// renders as an empty string.
#[must_use]
pub fn display_date(text: &str) -> String {
    text.get(..10)
        .and_then(parse_wire_date)
        .map(|d| d.format("%d-%m-%Y").to_string())
        .unwrap_or_default()
}

/// Translates a moment-style pattern (`DD-MM-YYYY HH:mm`) into a chrono
/// format string. Unknown characters are copied literally.
#[must_use]
pub fn to_strftime(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 7] = [
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut rest = pattern;
    'scan: while let Some(c) = rest.chars().next() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'scan;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Default display pattern for a temporal data type.
#[must_use]
pub fn default_format(data_type: DataType) -> Option<&'static str> {
    match data_type {
        DataType::Date | DataType::DateRange => Some(DEFAULT_DATE_FORMAT),
        DataType::Time => Some(DEFAULT_TIME_FORMAT),
        DataType::DateTime => Some(DEFAULT_DATETIME_FORMAT),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// FormValue
// ---------------------------------------------------------------------------

/// A value held by a form control.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Json(Value),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl FormValue {
    /// Wraps a wire value, turning strict `YYYY-MM-DD` strings into dates.
    #[must_use]
    pub fn from_wire(value: Value) -> Self {
        if let Some(date) = value.as_str().and_then(parse_wire_date) {
            return Self::Date(date);
        }
        Self::Json(value)
    }

    /// Wraps a wire value using the field's declared type: datetimes and
    /// times are parsed as such, date ranges element-wise stay JSON.
    #[must_use]
    pub fn from_typed(value: Value, data_type: DataType) -> Self {
        let Value::String(text) = &value else {
            return Self::Json(value);
        };
        let parsed = match data_type {
            DataType::DateTime => parse_wire_datetime(text).map(Self::DateTime),
            DataType::Time => parse_wire_time(text).map(Self::Time),
            DataType::Date => text.get(..10).and_then(parse_wire_date).map(Self::Date),
            _ => parse_wire_date(text).map(Self::Date),
        };
        parsed.unwrap_or(Self::Json(value))
    }

    /// Back to the wire representation.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Date(d) => Value::String(d.format(WIRE_DATE).to_string()),
            Self::DateTime(dt) => Value::String(dt.format(WIRE_DATETIME).to_string()),
            Self::Time(t) => Value::String(t.format(WIRE_TIME).to_string()),
        }
    }

    /// Display text using a moment-style pattern for temporal values.
    ///
    /// A pattern asking for components the value lacks (hours of a plain
    /// date) falls back to the wire text.
    #[must_use]
    pub fn display(&self, pattern: Option<&str>) -> String {
        let fmt = |default: &'static str| to_strftime(pattern.unwrap_or(default));
        let mut out = String::new();
        let written = match self {
            Self::Json(v) => return crate::types::value_text(v),
            Self::Date(d) => write!(out, "{}", d.format(&fmt(DEFAULT_DATE_FORMAT))),
            Self::DateTime(dt) => write!(out, "{}", dt.format(&fmt(DEFAULT_DATETIME_FORMAT))),
            Self::Time(t) => write!(out, "{}", t.format(&fmt(DEFAULT_TIME_FORMAT))),
        };
        match written {
            Ok(()) => out,
            Err(_) => crate::types::value_text(&self.to_wire()),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_temporal(&self) -> bool {
        !matches!(self, Self::Json(_))
    }
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<NaiveDate> for FormValue {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

// ---------------------------------------------------------------------------
// FormValues
// ---------------------------------------------------------------------------

/// Value bag of a form, keyed by field name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormValues {
    values: BTreeMap<String, FormValue>,
}

impl FormValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a row, converting every strict `YYYY-MM-DD` string to a date.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            values: row
                .iter()
                .map(|(k, v)| (k.clone(), FormValue::from_wire(v.clone())))
                .collect(),
        }
    }

    /// Loads a row, parsing temporal fields by their declared type. Fields
    /// absent from the structure fall back to [`FormValue::from_wire`].
    #[must_use]
    pub fn from_row_typed(row: &Row, structure: &Structure) -> Self {
        Self {
            values: row
                .iter()
                .map(|(k, v)| {
                    let value = match structure.find(k) {
                        Some(d) => FormValue::from_typed(v.clone(), d.data_type),
                        None => FormValue::from_wire(v.clone()),
                    };
                    (k.clone(), value)
                })
                .collect(),
        }
    }

    /// Wire row with dates formatted back to strings.
    #[must_use]
    pub fn to_row(&self) -> Row {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect()
    }

    /// Wire row used as a formula context.
    #[must_use]
    pub fn to_context(&self) -> Row {
        self.to_row()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FormValue> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FormValue>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<FormValue> {
        self.values.remove(field)
    }

    /// Overwrites entries with the values of a wire row.
    pub fn merge_row(&mut self, row: &Row) {
        for (k, v) in row {
            self.values.insert(k.clone(), FormValue::Json(v.clone()));
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.values.iter()
    }
}

impl FromIterator<(String, FormValue)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, FormValue)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}
