//! Raw server field metadata to canonical [`FieldDescriptor`].
//!
//! The backend describes fields with loosely-typed JSON objects whose keys
//! vary between screens (`widget` vs `type`, `fieldShow` vs `field_show`,
//! options as arrays or maps). [`normalize`] is the single pure function that
//! turns any of those shapes into a [`FieldDescriptor`].

use serde_json::{Map, Value};

use crate::field::{DataType, FieldDescriptor, FieldOption};
use crate::formula::Formula;
use crate::types::value_text;

/// Keys consulted, in order, when resolving the data type.
const TYPE_SOURCES: [&str; 6] = ["widget", "component", "control", "data_type", "dataType", "type"];

/// How a rule needle matches a type hint.
#[derive(Clone, Copy)]
enum Needle {
    /// Anywhere in the lower-cased hint.
    Part(&'static str),
    /// A whole word of the hint (see [`hint_words`]).
    Word(&'static str),
}

/// Splits a hint into lower-cased words at non-alphanumerics, camel-case
/// humps and letter/digit boundaries: `RangePicker` gives `range picker`,
/// `int4` gives `int 4`.
fn hint_words(hint: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    for c in hint.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let boundary = prev.is_some_and(|p| {
            (p.is_lowercase() && c.is_uppercase()) || (p.is_alphabetic() != c.is_alphabetic())
        });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

use Needle::{Part, Word};

/// Ordered rules. The first rule with a matching needle wins, so more
/// specific kinds (`daterange`, `datetime`, `textarea`) precede the kinds
/// whose names they contain. Short needles that occur inside unrelated names
/// (`int` in `print_code`) only match as whole words.
const TYPE_RULES: &[(DataType, &[Needle])] = &[
    (DataType::DateRange, &[Part("daterange"), Word("range")]),
    (DataType::DateTime, &[Part("datetime"), Part("timestamp")]),
    (DataType::Date, &[Part("date")]),
    (DataType::Time, &[Part("time"), Part("hour")]),
    (DataType::TextArea, &[Part("textarea")]),
    (
        DataType::Select,
        &[Part("select"), Part("combo"), Part("entry"), Part("completion"), Part("autocomplete")],
    ),
    (DataType::Boolean, &[Part("bool"), Part("switch"), Part("check")]),
    (DataType::Password, &[Part("password")]),
    (DataType::Email, &[Part("mail")]),
    (DataType::Rut, &[Part("rut")]),
    (DataType::File, &[Part("file"), Part("upload")]),
    (
        DataType::Integer,
        &[Part("integer"), Part("bigint"), Part("smallint"), Word("int")],
    ),
    (
        DataType::Number,
        &[Part("decimal"), Part("float"), Part("double"), Part("numeric"), Part("number"), Part("money")],
    ),
    (DataType::String, &[Part("string"), Part("text"), Part("char")]),
];

/// Converts one raw field object into a [`FieldDescriptor`].
///
/// Returns `None` when the input is not an object or has no non-empty
/// `field`/`name`; such descriptors are dropped by every caller.
#[must_use]
pub fn normalize(raw: &Value) -> Option<FieldDescriptor> {
    let obj = raw.as_object()?;
    let field = non_empty_str(obj, &["field", "name"])?.to_string();

    let visible = !(flag(obj, &["visible"]) == Some(false)
        || flag(obj, &["in_form", "inForm"]) == Some(false));
    let editable = !(flag(obj, &["editable"]) == Some(false)
        || flag(obj, &["show_disabled", "showDisabled"]) == Some(true));
    let required = flag(obj, &["not_null", "notNull"]) == Some(true)
        || flag(obj, &["required"]) == Some(true);
    let multiple = flag(obj, &["multiple"]) == Some(true)
        || non_empty_str(obj, &["mode"]) == Some("multiple");

    let label = non_empty_str(obj, &["label"])
        .map_or_else(|| derive_label(&field), str::to_string);

    Some(FieldDescriptor {
        label,
        data_type: resolve_data_type(obj),
        widget: non_empty_str(obj, &["widget"]).map(str::to_string),
        visible,
        editable,
        in_table: flag(obj, &["in_table", "inTable"]) == Some(true),
        in_form: flag(obj, &["in_form", "inForm"]) != Some(false),
        required,
        options: obj.get("options").map(normalize_options).unwrap_or_default(),
        api_ref: non_empty_str(obj, &["api_ref", "apiRef"]).map(str::to_string),
        persist: flag(obj, &["persist"]) != Some(false),
        func: obj.get("func").and_then(Formula::from_json),
        func_agg: non_empty_str(obj, &["func_agg", "funcAgg"]).map(str::to_string),
        fields_agg: get(obj, &["fields_agg", "fieldsAgg"]).and_then(Formula::from_json),
        agg_over_layout: non_empty_str(obj, &["agg_over_layout", "aggOverLayout"])
            .map(str::to_string),
        field_show: non_empty_str(obj, &["field_show", "fieldShow"]).map(str::to_string),
        precision: number(obj, "precision")
            .filter(|p| *p >= 0.0)
            .map(|p| to_u32(p.trunc())),
        min: number(obj, "min"),
        max: number(obj, "max"),
        step: number(obj, "step").filter(|s| *s > 0.0),
        format: non_empty_str(obj, &["format"]).map(str::to_string),
        multiple,
        sortable: flag(obj, &["order"]) != Some(false),
        field,
    })
}

/// Resolves the [`DataType`] from the first type-hint source whose
/// lower-cased text matches a rule. Defaults to [`DataType::String`].
#[must_use]
pub fn resolve_data_type(obj: &Map<String, Value>) -> DataType {
    TYPE_SOURCES
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find_map(match_type_rule)
        .unwrap_or(DataType::String)
}

fn match_type_rule(hint: &str) -> Option<DataType> {
    let lower = hint.to_lowercase();
    let words = hint_words(hint);
    TYPE_RULES
        .iter()
        .find(|(_, needles)| {
            needles.iter().any(|needle| match *needle {
                Part(part) => lower.contains(part),
                Word(word) => words.iter().any(|w| w == word),
            })
        })
        .map(|(data_type, _)| *data_type)
}

/// Normalizes an options source into an ordered `{value, label}` list.
///
/// Accepts an array of objects (value aliases `value`/`id`/`key`, label
/// aliases `label`/`text`/`name`/`nombre`), an array of scalars, or an object
/// mapping value to label. Anything else yields an empty list.
#[must_use]
pub fn normalize_options(source: &Value) -> Vec<FieldOption> {
    match source {
        Value::Array(items) => items.iter().filter_map(option_from_item).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(value, label)| FieldOption {
                value: Value::String(value.clone()),
                label: value_text(label),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn option_from_item(item: &Value) -> Option<FieldOption> {
    match item {
        Value::Object(obj) => {
            let value = get(obj, &["value", "id", "key"]).filter(|v| !v.is_null());
            let label = get(obj, &["label", "text", "name", "nombre"]).filter(|v| !v.is_null());
            match (value, label) {
                (Some(value), Some(label)) => Some(FieldOption {
                    value: value.clone(),
                    label: value_text(label),
                }),
                (Some(value), None) => Some(FieldOption {
                    value: value.clone(),
                    label: value_text(value),
                }),
                (None, Some(label)) => Some(FieldOption {
                    value: label.clone(),
                    label: value_text(label),
                }),
                (None, None) => None,
            }
        }
        Value::Null => None,
        scalar => Some(FieldOption {
            value: scalar.clone(),
            label: value_text(scalar),
        }),
    }
}

/// Builds a display label from a field name: underscores become spaces,
/// camelCase boundaries are split and the first letter is capitalized.
///
/// `"fecha_ingreso"` becomes `"Fecha ingreso"`, `"startDate"` becomes
/// `"Start Date"`.
#[must_use]
pub fn derive_label(field: &str) -> String {
    let mut spaced = String::with_capacity(field.len() + 4);
    let mut prev: Option<char> = None;
    for ch in field.chars() {
        if ch == '_' || ch == '-' {
            spaced.push(' ');
        } else {
            if ch.is_uppercase() && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                spaced.push(' ');
            }
            spaced.push(ch);
        }
        prev = Some(ch);
    }
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Raw accessors
// ---------------------------------------------------------------------------

fn get<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

fn flag(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_bool))
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u32(n: f64) -> u32 {
    n.min(f64::from(u32::MAX)) as u32
}
