//! Canonical field descriptor produced by [`normalize`](crate::normalize::normalize).
//!
//! Every downstream consumer (form, table, formulas, sessions) pattern-matches
//! on [`DataType`] instead of re-deriving a type from the raw widget hint.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::formula::Formula;

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Closed set of value kinds a field can hold.
///
/// Wire names are the camelCase identifiers used by the backend metadata.
/// Each wire name resolves back to the same variant through the widget rule
/// list, which keeps normalization idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "dateRange")]
    DateRange,
    #[serde(rename = "textarea")]
    TextArea,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "rut")]
    Rut,
    #[serde(rename = "file")]
    File,
}

impl DataType {
    /// Wire name of this data type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::DateRange => "dateRange",
            Self::TextArea => "textarea",
            Self::Select => "select",
            Self::Password => "password",
            Self::Email => "email",
            Self::Rut => "rut",
            Self::File => "file",
        }
    }

    /// `true` for [`DataType::Integer`] and [`DataType::Number`].
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

// ---------------------------------------------------------------------------
// FieldOption
// ---------------------------------------------------------------------------

/// One selectable `{value, label}` pair of a select field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Value stored in the row when this option is chosen.
    pub value: Value,
    /// Human-readable text shown for this option.
    pub label: String,
}

impl FieldOption {
    /// Compares an option value against a row value, tolerating the
    /// number-vs-string mismatch common in server payloads (`1` vs `"1"`).
    #[must_use]
    pub fn matches(&self, candidate: &Value) -> bool {
        if &self.value == candidate {
            return true;
        }
        match (&self.value, candidate) {
            (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => {
                a.to_string() == b.trim()
            }
            _ => false,
        }
    }
}

/// Finds the label of the option whose value matches `value`.
#[must_use]
pub fn option_label<'a>(options: &'a [FieldOption], value: &Value) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.matches(value))
        .map(|opt| opt.label.as_str())
}

// ---------------------------------------------------------------------------
// AggregateFn
// ---------------------------------------------------------------------------

/// Reduction applied over the rows of a detail collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Sum,
    Average,
}

impl AggregateFn {
    /// Parses `func_agg`. `avg` and `average` (any case) select the mean;
    /// anything else, including an absent value, sums.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "avg" || s == "average" => Self::Average,
            _ => Self::Sum,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// Canonical description of one editable/displayable attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Key into row objects. Never empty.
    pub field: String,
    pub label: String,
    pub data_type: DataType,
    /// Raw widget hint as sent by the server.
    pub widget: Option<String>,
    pub visible: bool,
    pub editable: bool,
    pub in_table: bool,
    pub in_form: bool,
    pub required: bool,
    pub options: Vec<FieldOption>,
    /// Remote option source, fetched from `selects/{api_ref}`.
    pub api_ref: Option<String>,
    /// Whether the field is included in the save payload.
    pub persist: bool,
    /// Single-row computed value.
    pub func: Option<Formula>,
    /// Reduction over a detail collection (`sum` when absent).
    pub func_agg: Option<String>,
    /// Row-level formula evaluated for every row of `agg_over_layout`.
    pub fields_agg: Option<Formula>,
    /// Name of the detail tab the aggregate runs over.
    pub agg_over_layout: Option<String>,
    /// Dot path resolving a display label from a related nested object.
    pub field_show: Option<String>,
    pub precision: Option<u32>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// Display format override (moment-style tokens, e.g. `DD/MM/YYYY`).
    pub format: Option<String>,
    /// Multi-value select.
    pub multiple: bool,
    /// `false` when the server sent `order: false`.
    pub sortable: bool,
}

impl FieldDescriptor {
    /// Minimal descriptor with every flag at its default.
    #[must_use]
    pub fn new(field: impl Into<String>, data_type: DataType) -> Self {
        let field = field.into();
        Self {
            label: crate::normalize::derive_label(&field),
            field,
            data_type,
            widget: None,
            visible: true,
            editable: true,
            in_table: false,
            in_form: true,
            required: false,
            options: Vec::new(),
            api_ref: None,
            persist: true,
            func: None,
            func_agg: None,
            fields_agg: None,
            agg_over_layout: None,
            field_show: None,
            precision: None,
            min: None,
            max: None,
            step: None,
            format: None,
            multiple: false,
            sortable: true,
        }
    }

    /// Whether the field participates in an input form.
    #[must_use]
    pub fn shown_in_form(&self) -> bool {
        self.visible && self.in_form
    }

    /// Whether the field produces a grid column.
    #[must_use]
    pub fn shown_in_table(&self) -> bool {
        self.in_table || self.field_show.is_some()
    }

    /// Whether the descriptor carries a cross-row aggregate.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.func_agg.is_some() && self.agg_over_layout.is_some()
    }

    /// Whether the value is computed rather than typed in.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.func.is_some() || self.is_aggregate()
    }

    /// Reduction selected by `func_agg`.
    #[must_use]
    pub fn aggregate_fn(&self) -> AggregateFn {
        AggregateFn::parse(self.func_agg.as_deref())
    }

    /// Serializes back to the raw metadata shape accepted by
    /// [`normalize`](crate::normalize::normalize).
    #[must_use]
    pub fn to_raw(&self) -> Value {
        let mut raw = Map::new();
        raw.insert("field".into(), json!(self.field));
        raw.insert("label".into(), json!(self.label));
        raw.insert("data_type".into(), json!(self.data_type.as_str()));
        if let Some(widget) = &self.widget {
            raw.insert("widget".into(), json!(widget));
        }
        raw.insert("visible".into(), json!(self.visible));
        raw.insert("editable".into(), json!(self.editable));
        raw.insert("in_table".into(), json!(self.in_table));
        raw.insert("in_form".into(), json!(self.in_form));
        raw.insert("required".into(), json!(self.required));
        raw.insert("not_null".into(), json!(self.required));
        raw.insert("persist".into(), json!(self.persist));
        raw.insert("multiple".into(), json!(self.multiple));
        raw.insert("order".into(), json!(self.sortable));
        if !self.options.is_empty() {
            raw.insert("options".into(), json!(self.options));
        }
        let optional = [
            ("api_ref", self.api_ref.as_ref().map(|v| json!(v))),
            ("func", self.func.as_ref().map(Formula::to_json)),
            ("func_agg", self.func_agg.as_ref().map(|v| json!(v))),
            ("fields_agg", self.fields_agg.as_ref().map(Formula::to_json)),
            ("agg_over_layout", self.agg_over_layout.as_ref().map(|v| json!(v))),
            ("field_show", self.field_show.as_ref().map(|v| json!(v))),
            ("precision", self.precision.map(|v| json!(v))),
            ("min", self.min.map(|v| json!(v))),
            ("max", self.max.map(|v| json!(v))),
            ("step", self.step.map(|v| json!(v))),
            ("format", self.format.as_ref().map(|v| json!(v))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                raw.insert(key.into(), value);
            }
        }
        Value::Object(raw)
    }
}

impl Serialize for FieldDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn data_type_wire_names_roundtrip_through_serde() {
        let encoded = serde_json::to_value(DataType::DateRange).expect("serialize");
        assert_eq!(encoded, json!("dateRange"));
        let decoded: DataType = serde_json::from_value(json!("datetime")).expect("deserialize");
        assert_eq!(decoded, DataType::DateTime);
    }

    #[test]
    fn option_matches_across_number_and_string() {
        let opt = FieldOption { value: json!(3), label: "Tres".into() };
        assert!(opt.matches(&json!("3")));
        assert!(opt.matches(&json!(3)));
        assert!(!opt.matches(&json!(4)));
        assert_eq!(option_label(&[opt], &json!("3")), Some("Tres"));
    }

    #[test]
    fn aggregate_fn_parsing() {
        assert_eq!(AggregateFn::parse(None), AggregateFn::Sum);
        assert_eq!(AggregateFn::parse(Some("sum")), AggregateFn::Sum);
        assert_eq!(AggregateFn::parse(Some("AVG")), AggregateFn::Average);
        assert_eq!(AggregateFn::parse(Some("Average")), AggregateFn::Average);
        assert_eq!(AggregateFn::parse(Some("max")), AggregateFn::Sum);
    }

    #[test]
    fn new_descriptor_defaults() {
        let d = FieldDescriptor::new("fecha_ingreso", DataType::Date);
        assert_eq!(d.label, "Fecha ingreso");
        assert!(d.shown_in_form());
        assert!(!d.shown_in_table());
        assert!(!d.is_computed());
    }
}
