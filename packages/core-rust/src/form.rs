//! Dynamic form contract.
//!
//! [`FormModel`] turns a structure and an initial value bag into typed
//! controls, a layout that mirrors the structure's shape, and the keyboard,
//! blur, validation and submit behavior a renderer wires to its widgets.

use std::sync::OnceLock;

use regex::Regex;

use crate::dates::{default_format, FormValue, FormValues};
use crate::field::{DataType, FieldDescriptor, FieldOption};
use crate::formula::calculate_field_values;
use crate::rut::validate_rut_input;
use crate::structure::Structure;
use crate::types::{is_blank, value_text, Layouts, Row};

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Input widget chosen for a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Text,
    TextArea,
    /// Masked input without a visibility toggle.
    Password,
    Number {
        step: f64,
        precision: Option<u32>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Switch,
    Date { format: String },
    Time { format: String },
    DateTime { format: String },
    DateRange { format: String },
    /// Searchable select fed by static options or the remote `api_ref`.
    Select {
        options: Vec<FieldOption>,
        api_ref: Option<String>,
        multiple: bool,
    },
    Email,
    Upload,
    Rut,
}

impl ControlKind {
    #[must_use]
    pub fn for_descriptor(descriptor: &FieldDescriptor) -> Self {
        let format = || {
            descriptor
                .format
                .clone()
                .or_else(|| default_format(descriptor.data_type).map(str::to_string))
                .unwrap_or_default()
        };
        match descriptor.data_type {
            DataType::String => Self::Text,
            DataType::TextArea => Self::TextArea,
            DataType::Password => Self::Password,
            DataType::Integer | DataType::Number => Self::Number {
                step: number_step(descriptor.precision, descriptor.step),
                precision: descriptor.precision,
                min: descriptor.min,
                max: descriptor.max,
            },
            DataType::Boolean => Self::Switch,
            DataType::Date => Self::Date { format: format() },
            DataType::Time => Self::Time { format: format() },
            DataType::DateTime => Self::DateTime { format: format() },
            DataType::DateRange => Self::DateRange { format: format() },
            DataType::Select => Self::Select {
                options: descriptor.options.clone(),
                api_ref: descriptor.api_ref.clone(),
                multiple: descriptor.multiple,
            },
            DataType::Email => Self::Email,
            DataType::File => Self::Upload,
            DataType::Rut => Self::Rut,
        }
    }
}

/// Spinner increment: the explicit `step`, else `10^-(precision-1)`, else 1.
#[must_use]
pub fn number_step(precision: Option<u32>, step: Option<f64>) -> f64 {
    if let Some(step) = step {
        return step;
    }
    precision
        .and_then(|p| i32::try_from(p).ok())
        .map_or(1.0, |p| 10f64.powi(1 - p))
}

/// One rendered input.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub field: String,
    pub label: String,
    pub kind: ControlKind,
    pub required: bool,
    pub editable: bool,
}

impl Control {
    fn from_descriptor(descriptor: &FieldDescriptor) -> Self {
        Self {
            field: descriptor.field.clone(),
            label: descriptor.label.clone(),
            kind: ControlKind::for_descriptor(descriptor),
            required: descriptor.required,
            editable: descriptor.editable,
        }
    }
}

/// Control positions arranged like the source structure. Indices point
/// into [`FormModel::controls`].
#[derive(Debug, Clone, PartialEq)]
pub enum FormLayout {
    Flat(Vec<usize>),
    Groups(Vec<(String, Vec<usize>)>),
    Grid(Vec<Vec<usize>>),
}

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// Result of pressing Enter inside a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Submit,
    Ignore,
}

/// Emitted when a control loses focus.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurEvent {
    /// `{field: current value}` of the blurred control, in wire form.
    pub changed: Row,
    pub values: FormValues,
}

/// A failed validation rule, shown inline next to the control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

fn is_valid_email(text: &str) -> bool {
    email_pattern().map_or(true, |re| re.is_match(text.trim()))
}

// ---------------------------------------------------------------------------
// FormModel
// ---------------------------------------------------------------------------

/// Editable form derived from a structure and a value bag.
#[derive(Debug, Clone)]
pub struct FormModel {
    source: Structure,
    controls: Vec<Control>,
    layout: FormLayout,
    values: FormValues,
}

impl FormModel {
    /// Builds controls for every `visible && in_form` descriptor.
    ///
    /// The unfiltered structure is kept so hidden computed fields still take
    /// part in [`FormModel::recalculate`].
    #[must_use]
    pub fn new(structure: &Structure, values: FormValues) -> Self {
        let shown = structure.filter_form_structure();
        let mut controls = Vec::with_capacity(shown.len());
        let mut place = |fields: &[FieldDescriptor]| -> Vec<usize> {
            fields
                .iter()
                .map(|d| {
                    controls.push(Control::from_descriptor(d));
                    controls.len() - 1
                })
                .collect()
        };
        let layout = match &shown {
            Structure::Flat(fields) => FormLayout::Flat(place(fields.as_slice())),
            Structure::Grouped(groups) => FormLayout::Groups(
                groups
                    .iter()
                    .map(|g| (g.name.clone(), place(g.fields.as_slice())))
                    .collect(),
            ),
            Structure::Grid(rows) => {
                FormLayout::Grid(rows.iter().map(|r| place(r.as_slice())).collect())
            }
        };
        Self {
            source: structure.clone(),
            controls,
            layout,
            values,
        }
    }

    #[must_use]
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    #[must_use]
    pub fn control(&self, field: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.field == field)
    }

    #[must_use]
    pub fn layout(&self) -> &FormLayout {
        &self.layout
    }

    #[must_use]
    pub fn values(&self) -> &FormValues {
        &self.values
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FormValue> {
        self.values.get(field)
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: impl Into<FormValue>) {
        self.values.set(field, value);
    }

    /// Replaces the whole bag (form reset or reload).
    pub fn reset(&mut self, values: FormValues) {
        self.values = values;
    }

    /// Field of the last control that is both visible and editable.
    #[must_use]
    pub fn submit_field(&self) -> Option<&str> {
        self.controls
            .iter()
            .rev()
            .find(|c| c.editable)
            .map(|c| c.field.as_str())
    }

    /// Enter submits only from the last editable, visible control.
    #[must_use]
    pub fn on_enter(&self, field: &str) -> EnterOutcome {
        if self.submit_field() == Some(field) {
            EnterOutcome::Submit
        } else {
            EnterOutcome::Ignore
        }
    }

    /// Blur payload for a rendered control; `None` for unknown fields.
    #[must_use]
    pub fn blur(&self, field: &str) -> Option<BlurEvent> {
        let control = self.control(field)?;
        let current = self
            .values
            .get(&control.field)
            .map_or(serde_json::Value::Null, FormValue::to_wire);
        let mut changed = Row::new();
        changed.insert(control.field.clone(), current);
        Some(BlurEvent {
            changed,
            values: self.values.clone(),
        })
    }

    /// Applies the declared rules of every rendered control. At most one
    /// error is reported per field.
    #[must_use]
    pub fn validate(&self) -> Vec<FieldError> {
        self.controls
            .iter()
            .filter_map(|control| self.check(control))
            .collect()
    }

    fn check(&self, control: &Control) -> Option<FieldError> {
        let wire = self.values.get(&control.field).map(FormValue::to_wire);
        let error = |message: String| {
            Some(FieldError {
                field: control.field.clone(),
                message,
            })
        };
        if control.required && is_blank(wire.as_ref()) {
            return error(format!("El campo {} es requerido!", control.label));
        }
        let text = wire.as_ref().map(value_text).unwrap_or_default();
        if text.trim().is_empty() {
            return None;
        }
        match control.kind {
            ControlKind::Email if !is_valid_email(&text) => {
                error(format!("El campo {} no es un correo válido!", control.label))
            }
            ControlKind::Rut if !validate_rut_input(&text) => {
                error(format!("El campo {} no es un RUT válido!", control.label))
            }
            ControlKind::Number { min, max, .. } => {
                let number = match wire.as_ref() {
                    Some(serde_json::Value::Number(n)) => n.as_f64(),
                    _ => text.trim().replace(',', ".").parse::<f64>().ok(),
                };
                match number {
                    None => error(format!("El campo {} debe ser numérico!", control.label)),
                    Some(n) if min.is_some_and(|min| n < min) => error(format!(
                        "El campo {} debe ser mayor o igual a {}!",
                        control.label,
                        min.unwrap_or_default()
                    )),
                    Some(n) if max.is_some_and(|max| n > max) => error(format!(
                        "El campo {} debe ser menor o igual a {}!",
                        control.label,
                        max.unwrap_or_default()
                    )),
                    Some(_) => None,
                }
            }
            _ => None,
        }
    }

    /// Validates and hands back the bag unchanged.
    ///
    /// # Errors
    ///
    /// Returns every failed rule when validation blocks submission.
    pub fn submit(&self) -> Result<FormValues, Vec<FieldError>> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self.values.clone())
        } else {
            Err(errors)
        }
    }

    /// Re-evaluates formula and aggregate fields against the current bag,
    /// writes the results into it and returns them.
    pub fn recalculate(&mut self, layouts: &Layouts) -> Row {
        let computed = calculate_field_values(&self.source, &self.values.to_context(), layouts);
        self.values.merge_row(&computed);
        computed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn structure(raw: serde_json::Value) -> Structure {
        Structure::from_json(&raw)
    }

    fn form(raw: serde_json::Value, values: serde_json::Value) -> FormModel {
        let row = values.as_object().cloned().unwrap_or_default();
        FormModel::new(&structure(raw), FormValues::from_row(&row))
    }

    #[test]
    fn controls_follow_data_type() {
        let f = form(
            json!([
                {"field": "nombre"},
                {"field": "clave", "type": "password"},
                {"field": "sueldo", "type": "decimal", "precision": 3},
                {"field": "activo", "type": "boolean"},
                {"field": "ingreso", "type": "date"},
                {"field": "turno", "type": "datetime", "format": "DD/MM/YYYY HH:mm"},
                {"field": "cargo", "widget": "select", "api_ref": "cargos"},
                {"field": "contrato", "type": "upload"},
                {"field": "rut", "type": "rut"},
            ]),
            json!({}),
        );
        let kinds: Vec<&ControlKind> = f.controls().iter().map(|c| &c.kind).collect();
        assert_eq!(kinds[0], &ControlKind::Text);
        assert_eq!(kinds[1], &ControlKind::Password);
        assert!(matches!(kinds[2], ControlKind::Number { step, .. } if (*step - 0.01).abs() < 1e-12));
        assert_eq!(kinds[3], &ControlKind::Switch);
        assert_eq!(kinds[4], &ControlKind::Date { format: "DD-MM-YYYY".into() });
        assert_eq!(kinds[5], &ControlKind::DateTime { format: "DD/MM/YYYY HH:mm".into() });
        assert!(matches!(kinds[6], ControlKind::Select { api_ref: Some(r), .. } if r == "cargos"));
        assert_eq!(kinds[7], &ControlKind::Upload);
        assert_eq!(kinds[8], &ControlKind::Rut);
    }

    #[test]
    fn number_step_rules() {
        assert!((number_step(Some(2), None) - 0.1).abs() < 1e-12);
        assert!((number_step(Some(1), None) - 1.0).abs() < 1e-12);
        assert!((number_step(None, None) - 1.0).abs() < 1e-12);
        assert!((number_step(Some(4), Some(5.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn layout_mirrors_grouped_shape_without_hidden_fields() {
        let f = form(
            json!({
                "Personal": [{"field": "a"}, {"field": "b", "visible": false}],
                "Oculto": [{"field": "c", "in_form": false}],
                "Laboral": [{"field": "d"}],
            }),
            json!({}),
        );
        match f.layout() {
            FormLayout::Groups(groups) => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0], ("Personal".to_string(), vec![0]));
                assert_eq!(groups[1], ("Laboral".to_string(), vec![1]));
            }
            other => panic!("expected groups, got {other:?}"),
        }
    }

    #[test]
    fn enter_submits_only_from_last_editable_field() {
        let f = form(
            json!([
                {"field": "a"},
                {"field": "b"},
                {"field": "c", "editable": false},
                {"field": "d", "visible": false},
            ]),
            json!({}),
        );
        assert_eq!(f.submit_field(), Some("b"));
        assert_eq!(f.on_enter("a"), EnterOutcome::Ignore);
        assert_eq!(f.on_enter("b"), EnterOutcome::Submit);
        assert_eq!(f.on_enter("c"), EnterOutcome::Ignore);
        assert_eq!(f.on_enter("d"), EnterOutcome::Ignore);
    }

    #[test]
    fn required_field_blocks_submit() {
        let mut f = form(json!([{"field": "nombre_completo", "required": true}]), json!({}));
        let errors = f.submit().expect_err("blank required field");
        assert_eq!(errors[0].field, "nombre_completo");
        assert_eq!(errors[0].message, "El campo Nombre completo es requerido!");

        f.set_value("nombre_completo", json!("Ana"));
        let values = f.submit().expect("valid form");
        assert_eq!(values.get("nombre_completo"), Some(&FormValue::Json(json!("Ana"))));
    }

    #[test]
    fn email_rule() {
        let mut f = form(json!([{"field": "correo", "type": "email"}]), json!({"correo": "ana@"}));
        assert_eq!(f.validate()[0].message, "El campo Correo no es un correo válido!");
        f.set_value("correo", json!("ana@empresa.cl"));
        assert!(f.validate().is_empty());
        f.set_value("correo", json!(""));
        assert!(f.validate().is_empty());
    }

    #[test]
    fn rut_rule_tolerates_in_progress_input() {
        let raw = json!([{"field": "rut", "type": "rut", "label": "RUT"}]);
        let check = |value: &str| form(raw.clone(), json!({"rut": value})).validate();
        assert_eq!(check("11.111.111-1")[0].message, "El campo RUT no es un RUT válido!");
        assert!(check("7.954.973-8").is_empty());
        assert!(check("11").is_empty());
    }

    #[test]
    fn number_bounds_rule() {
        let raw = json!([{"field": "horas", "type": "number", "min": 0, "max": 45}]);
        let check = |value: serde_json::Value| form(raw.clone(), json!({"horas": value})).validate();
        assert_eq!(check(json!(-1))[0].message, "El campo Horas debe ser mayor o igual a 0!");
        assert_eq!(check(json!(45.5))[0].message, "El campo Horas debe ser menor o igual a 45!");
        assert_eq!(check(json!("50"))[0].field, "horas");
        assert_eq!(check(json!("abc"))[0].message, "El campo Horas debe ser numérico!");
        assert!(check(json!(45)).is_empty());
        assert!(check(json!("12,5")).is_empty());
        assert!(check(json!(null)).is_empty());
    }

    #[test]
    fn blur_reports_field_and_bag() {
        let f = form(json!([{"field": "a"}, {"field": "b"}]), json!({"a": 1, "b": "2024-05-01"}));
        let event = f.blur("b").expect("blur");
        assert_eq!(event.changed.get("b"), Some(&json!("2024-05-01")));
        assert_eq!(event.values.len(), 2);
        assert!(f.blur("missing").is_none());
    }

    #[test]
    fn recalculate_includes_hidden_computed_fields() {
        let mut f = form(
            json!([
                {"field": "cantidad", "type": "number"},
                {"field": "precio", "type": "number"},
                {"field": "total", "type": "number", "visible": false, "func": ["cantidad", "*", "precio"]},
            ]),
            json!({"cantidad": 3, "precio": "2.5"}),
        );
        let computed = f.recalculate(&Layouts::new());
        assert_eq!(computed.get("total"), Some(&json!(7.5)));
        assert_eq!(f.value("total"), Some(&FormValue::Json(json!(7.5))));
    }
}
