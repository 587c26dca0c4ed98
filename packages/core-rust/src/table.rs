//! Dynamic table/grid contract.
//!
//! [`TableModel::derive`] reads the same descriptors the form uses and
//! produces column definitions: which fields become columns, how each cell
//! renders, its alignment, its filter and whether it sorts. Rendering and
//! client-side filtering operate on plain [`Row`]s.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::dates::{display_date, FormValues};
use crate::field::{option_label, DataType, FieldDescriptor, FieldOption};
use crate::query::FilterValue;
use crate::structure::Structure;
use crate::types::{coerce_number, finite_or_zero, is_blank, lookup_path, value_text, Row};

/// Confirmation shown before a row is deleted.
pub const DELETE_CONFIRMATION: &str = "¿Está seguro de eliminar este registro?";

// ---------------------------------------------------------------------------
// Column definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Cell transform, chosen once per column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRender {
    /// Chilean number formatting.
    Number { precision: Option<u32> },
    /// `SI` / `NO`.
    Boolean,
    /// Thumbnail from the file endpoint with a cache-busting timestamp.
    Avatar,
    /// Text found at a dot path inside the row's related object.
    Relation { path: String },
    /// `YYYY-MM-DD` shown as `DD-MM-YYYY`.
    Date,
    /// Download / preview link from the file endpoint.
    Attachment,
    /// Option label of a select value.
    Select { options: Vec<FieldOption> },
    Plain,
}

impl CellRender {
    /// First matching rule wins.
    #[must_use]
    pub fn for_descriptor(descriptor: &FieldDescriptor) -> Self {
        let name = descriptor.field.to_lowercase();
        let ty = descriptor.data_type;
        if ty.is_numeric() {
            Self::Number { precision: descriptor.precision }
        } else if ty == DataType::Boolean {
            Self::Boolean
        } else if (name.contains("photo") || name.contains("logo"))
            && matches!(ty, DataType::String | DataType::File)
        {
            Self::Avatar
        } else if let Some(path) = &descriptor.field_show {
            Self::Relation { path: path.clone() }
        } else if is_date_like(descriptor) {
            Self::Date
        } else if name.contains("attached") {
            Self::Attachment
        } else if ty == DataType::Select {
            Self::Select { options: descriptor.options.clone() }
        } else {
            Self::Plain
        }
    }

    #[must_use]
    pub fn align(&self) -> Align {
        match self {
            Self::Number { .. } => Align::Right,
            Self::Boolean | Self::Date => Align::Center,
            _ => Align::Left,
        }
    }
}

fn is_date_like(descriptor: &FieldDescriptor) -> bool {
    descriptor.data_type == DataType::Date || descriptor.field.to_lowercase().contains("date")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Select,
    Number,
    Date,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Between,
    ILike,
}

/// Filter widget and operator of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub operator: FilterOperator,
    /// Wire format of date bounds.
    pub format: Option<&'static str>,
    pub options: Vec<FieldOption>,
}

impl FilterSpec {
    fn for_descriptor(descriptor: &FieldDescriptor, rows: &[Row]) -> Self {
        let (kind, operator) = if descriptor.field_show.is_some()
            || descriptor.data_type == DataType::Boolean
        {
            (FilterKind::Select, FilterOperator::Eq)
        } else if descriptor.data_type.is_numeric() {
            (FilterKind::Number, FilterOperator::Between)
        } else if is_date_like(descriptor) {
            (FilterKind::Date, FilterOperator::Between)
        } else {
            (FilterKind::Text, FilterOperator::ILike)
        };
        let options = if kind != FilterKind::Select {
            Vec::new()
        } else if !descriptor.options.is_empty() {
            descriptor.options.clone()
        } else if let Some(path) = &descriptor.field_show {
            scan_options(&descriptor.field, path, rows)
        } else {
            vec![
                FieldOption { value: Value::Bool(true), label: "SI".into() },
                FieldOption { value: Value::Bool(false), label: "NO".into() },
            ]
        };
        Self {
            kind,
            operator,
            format: (kind == FilterKind::Date).then_some("YYYY-MM-DD"),
            options,
        }
    }
}

/// Distinct value/label pairs found in the loaded rows, in first-seen order.
fn scan_options(field: &str, path: &str, rows: &[Row]) -> Vec<FieldOption> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| {
            let label = lookup_path(row, path).filter(|v| !v.is_null())?;
            let label = value_text(label);
            let value = row
                .get(field)
                .filter(|v| !v.is_null() && !v.is_object())
                .cloned()
                .unwrap_or_else(|| Value::String(label.clone()));
            seen.insert(value.to_string())
                .then_some(FieldOption { value, label })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Row key backing the column.
    pub field: String,
    pub title: String,
    pub data_type: DataType,
    pub render: CellRender,
    pub align: Align,
    pub filter: FilterSpec,
    pub sortable: bool,
}

impl Column {
    fn derive(descriptor: &FieldDescriptor, rows: &[Row]) -> Self {
        let render = CellRender::for_descriptor(descriptor);
        Self {
            field: descriptor.field.clone(),
            title: descriptor.label.clone(),
            data_type: descriptor.data_type,
            align: render.align(),
            render,
            filter: FilterSpec::for_descriptor(descriptor, rows),
            sortable: descriptor.sortable,
        }
    }

    /// Value a filter is tested against: the raw field, or the related
    /// text when the raw field is absent or is the related object itself.
    fn filter_source<'a>(&self, row: &'a Row) -> Option<&'a Value> {
        let raw = row.get(&self.field).filter(|v| !v.is_null() && !v.is_object());
        match &self.render {
            CellRender::Relation { path } if raw.is_none() => lookup_path(row, path),
            _ => raw,
        }
    }
}

/// Per-row actions appended as the last column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// Loads the row into the form.
    Edit,
    /// Deletes after the user accepts `confirm`.
    Delete { confirm: String },
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// Base URL of the file-serving endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileEndpoint {
    pub base_url: String,
}

impl FileEndpoint {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }

    #[must_use]
    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.base_url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn avatar_url(&self, name: &str, timestamp_ms: i64) -> String {
        format!("{}?t={timestamp_ms}", self.file_url(name))
    }
}

/// A rendered cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text { text: String, align: Align },
    Image { url: String },
    Attachment { url: String, name: String },
    Empty,
}

impl Cell {
    /// Visible text of the cell; images have none.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::Attachment { name, .. } => name,
            Self::Image { .. } | Self::Empty => "",
        }
    }
}

/// Formats a number the Chilean way: `.` groups thousands, `,` separates
/// decimals. With a precision the decimals are fixed, otherwise up to three
/// are kept and trailing zeros dropped.
#[must_use]
pub fn format_number(n: f64, precision: Option<u32>) -> String {
    let n = finite_or_zero(n);
    let digits = precision.unwrap_or(3).min(12) as usize;
    let fixed = format!("{:.*}", digits, n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = if precision.is_some() {
        frac_part
    } else {
        frac_part.trim_end_matches('0')
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 2);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let negative = n < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped},{frac_part}")
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "si" | "sí" | "s")
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Context menu
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    ExportToExcel,
}

/// Right-click menu anchored at a screen position.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenu {
    pub x: f64,
    pub y: f64,
    pub items: Vec<MenuItem>,
}

impl ContextMenu {
    pub const DISMISS_DX: f64 = 200.0;
    pub const DISMISS_DY: f64 = 50.0;

    /// Opens a menu at `(x, y)`; `None` when it would be empty.
    #[must_use]
    pub fn open(x: f64, y: f64, exportable: bool) -> Option<Self> {
        exportable.then(|| Self {
            x,
            y,
            items: vec![MenuItem::ExportToExcel],
        })
    }

    /// A click outside the tolerance box around the anchor closes the menu.
    #[must_use]
    pub fn should_dismiss(&self, click_x: f64, click_y: f64) -> bool {
        (click_x - self.x).abs() > Self::DISMISS_DX || (click_y - self.y).abs() > Self::DISMISS_DY
    }
}

// ---------------------------------------------------------------------------
// TableModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Hides the edit/delete action column.
    pub edition_disabled: bool,
    pub files: FileEndpoint,
    /// An export handler is available for the context menu.
    pub exportable: bool,
}

/// Column configuration for one grid.
#[derive(Debug, Clone)]
pub struct TableModel {
    columns: Vec<Column>,
    actions: Vec<RowAction>,
    options: TableOptions,
}

impl TableModel {
    /// Derives columns from every `in_table || field_show` descriptor.
    /// `rows` feeds the option scan of relation filters.
    #[must_use]
    pub fn derive(structure: &Structure, rows: &[Row], options: TableOptions) -> Self {
        let columns = structure
            .fields()
            .filter(|d| d.shown_in_table())
            .map(|d| Column::derive(d, rows))
            .collect();
        let actions = if options.edition_disabled {
            Vec::new()
        } else {
            vec![
                RowAction::Edit,
                RowAction::Delete { confirm: DELETE_CONFIRMATION.to_string() },
            ]
        };
        Self { columns, actions, options }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Row actions; empty when edition is disabled.
    #[must_use]
    pub fn actions(&self) -> &[RowAction] {
        &self.actions
    }

    #[must_use]
    pub fn context_menu(&self, x: f64, y: f64) -> Option<ContextMenu> {
        ContextMenu::open(x, y, self.options.exportable)
    }

    /// Renders with the current time as the avatar cache buster.
    #[must_use]
    pub fn render_cell(&self, column: &Column, row: &Row) -> Cell {
        self.render_cell_at(column, row, chrono::Utc::now().timestamp_millis())
    }

    #[must_use]
    pub fn render_cell_at(&self, column: &Column, row: &Row, timestamp_ms: i64) -> Cell {
        let value = row.get(&column.field);
        let text = |text: String| {
            if text.is_empty() {
                Cell::Empty
            } else {
                Cell::Text { text, align: column.align }
            }
        };
        match &column.render {
            CellRender::Boolean => {
                let label = if truthy(value) { "SI" } else { "NO" };
                text(label.to_string())
            }
            CellRender::Relation { path } => {
                text(lookup_path(row, path).map(value_text).unwrap_or_default())
            }
            _ if is_blank(value) => Cell::Empty,
            CellRender::Number { precision } => {
                text(format_number(coerce_number(value), *precision))
            }
            CellRender::Avatar => Cell::Image {
                url: self
                    .options
                    .files
                    .avatar_url(&value.map(value_text).unwrap_or_default(), timestamp_ms),
            },
            CellRender::Date => text(value.map(value_text).map(|v| display_date(&v)).unwrap_or_default()),
            CellRender::Attachment => {
                let name = value.map(value_text).unwrap_or_default();
                Cell::Attachment {
                    url: self.options.files.file_url(&name),
                    name,
                }
            }
            CellRender::Select { options } => {
                let stored = row
                    .get(&format!("{}_label", column.field))
                    .filter(|v| !is_blank(Some(v)))
                    .map(value_text);
                let label = stored.or_else(|| {
                    value.and_then(|v| option_label(options, v)).map(str::to_string)
                });
                text(label.unwrap_or_else(|| value.map(value_text).unwrap_or_default()))
            }
            CellRender::Plain => text(value.map(value_text).unwrap_or_default()),
        }
    }

    #[must_use]
    pub fn render_row(&self, row: &Row) -> Vec<Cell> {
        let now = chrono::Utc::now().timestamp_millis();
        self.columns
            .iter()
            .map(|c| self.render_cell_at(c, row, now))
            .collect()
    }

    /// Form values for the edit action: strict `YYYY-MM-DD` strings become
    /// dates, everything else is untouched.
    #[must_use]
    pub fn edit_values(row: &Row) -> FormValues {
        FormValues::from_row(row)
    }

    /// Rows passing every column filter. Filters on unknown columns are
    /// tested against the raw field.
    #[must_use]
    pub fn filter_rows<'a>(
        &self,
        rows: &'a [Row],
        filters: &BTreeMap<String, FilterValue>,
    ) -> Vec<&'a Row> {
        rows.iter()
            .filter(|row| {
                filters.iter().all(|(field, filter)| {
                    let source = match self.column(field) {
                        Some(column) => column.filter_source(row),
                        None => row.get(field),
                    };
                    filter.matches(source)
                })
            })
            .collect()
    }

    /// Header line plus one text line per row, for spreadsheet export.
    /// Images export their file name.
    #[must_use]
    pub fn export_rows(&self, rows: &[Row]) -> Vec<Vec<String>> {
        let header = self.columns.iter().map(|c| c.title.clone()).collect();
        let body = rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|c| match self.render_cell_at(c, row, 0) {
                    Cell::Image { .. } => row.get(&c.field).map(value_text).unwrap_or_default(),
                    cell => cell.text().to_string(),
                })
                .collect()
        });
        std::iter::once(header).chain(body).collect()
    }
}
