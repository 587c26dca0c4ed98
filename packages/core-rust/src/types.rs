//! Row and value primitives shared by every engine component.
//!
//! Rows travel as JSON objects exactly as the REST backend sends them. The
//! helpers here give the rest of the crate one place for dot-path lookup and
//! the total number coercion used by computed fields.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// One record: field name to value, in server key order.
pub type Row = Map<String, Value>;

/// Detail collections keyed by tab name, used as the evaluation source for
/// aggregate fields.
pub type Layouts = BTreeMap<String, Vec<Row>>;

/// Resolves a dot-separated path (`"cargo.nombre"`) inside a row.
///
/// Each segment indexes into a nested object; numeric segments also index
/// arrays. Returns `None` as soon as a segment cannot be followed.
#[must_use]
pub fn lookup_path<'a>(row: &'a Row, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = row.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Coerces any JSON value to a finite number. Never fails.
///
/// | input                          | result            |
/// |--------------------------------|-------------------|
/// | number                         | the number        |
/// | string parsing as a number     | the parsed number |
/// | `true` / `false`               | `1` / `0`         |
/// | empty or non-numeric string    | `0`               |
/// | null, array, object            | `0`               |
/// | missing (`None`)               | `0`               |
///
/// Non-finite results (NaN, infinities) also collapse to `0`.
#[must_use]
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    finite_or_zero(n)
}

pub(crate) fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Converts a computed number into a JSON value, keeping integral results
/// as integers so payloads read `7` rather than `7.0`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn number_value(n: f64) -> Value {
    let n = finite_or_zero(n);
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Number(Number::from(0)), Value::Number)
    }
}

/// Renders a scalar value as display text. Objects and arrays render as JSON.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Whether a value counts as "not filled in" for required-field checks.
#[must_use]
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(v: Value) -> Row {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn lookup_path_follows_nested_objects() {
        let r = row(json!({"cargo": {"nombre": "Analista", "area": {"id": 3}}}));
        assert_eq!(lookup_path(&r, "cargo.nombre"), Some(&json!("Analista")));
        assert_eq!(lookup_path(&r, "cargo.area.id"), Some(&json!(3)));
        assert_eq!(lookup_path(&r, "cargo.missing"), None);
        assert_eq!(lookup_path(&r, "cargo.nombre.deeper"), None);
    }

    #[test]
    fn lookup_path_indexes_arrays() {
        let r = row(json!({"items": [{"x": 1}, {"x": 2}]}));
        assert_eq!(lookup_path(&r, "items.1.x"), Some(&json!(2)));
    }

    #[test]
    fn coerce_number_table() {
        assert_eq!(coerce_number(Some(&json!(4.5))), 4.5);
        assert_eq!(coerce_number(Some(&json!(" 12 "))), 12.0);
        assert_eq!(coerce_number(Some(&json!(""))), 0.0);
        assert_eq!(coerce_number(Some(&json!("abc"))), 0.0);
        assert_eq!(coerce_number(Some(&json!(null))), 0.0);
        assert_eq!(coerce_number(Some(&json!(true))), 1.0);
        assert_eq!(coerce_number(Some(&json!([1]))), 0.0);
        assert_eq!(coerce_number(Some(&json!("NaN"))), 0.0);
        assert_eq!(coerce_number(Some(&json!("inf"))), 0.0);
        assert_eq!(coerce_number(None), 0.0);
    }

    #[test]
    fn number_value_keeps_integers_integral() {
        assert_eq!(number_value(7.0), json!(7));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), json!(0));
    }

    #[test]
    fn blank_values() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!("  "))));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }
}
