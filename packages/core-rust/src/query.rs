//! Pagination, sort, filter and search state of a grid, and the list query
//! it produces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::ListQuery;
use crate::types::{coerce_number, value_text};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const DEFAULT_PAGE_SIZE_OPTIONS: [u64; 4] = [10, 20, 50, 100];

// ---------------------------------------------------------------------------
// Pagination and sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    pub current: u64,
    pub page_size: u64,
    /// Server-authoritative row count.
    pub total: u64,
    pub page_size_options: Vec<u64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total: 0,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascend,
    Descend,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascend => "ascend",
            Self::Descend => "descend",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascend => Self::Descend,
            Self::Descend => Self::Ascend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorter {
    pub field: String,
    pub order: SortOrder,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// A column filter chosen by the user.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Exact match, tolerant of `1` vs `"1"`.
    Eq(Value),
    /// Inclusive range; either bound may be open. Numeric when both sides
    /// look numeric, otherwise compared as text (wire dates sort correctly).
    Between {
        from: Option<Value>,
        to: Option<Value>,
    },
    /// Case-insensitive substring match.
    Contains(String),
}

fn looks_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn within(cell: &Value, bound: &Value, lower: bool) -> bool {
    if looks_numeric(cell) && looks_numeric(bound) {
        let (c, b) = (coerce_number(Some(cell)), coerce_number(Some(bound)));
        if lower {
            c >= b
        } else {
            c <= b
        }
    } else {
        let (c, b) = (value_text(cell), value_text(bound));
        if lower {
            c >= b
        } else {
            c <= b
        }
    }
}

impl FilterValue {
    #[must_use]
    pub fn matches(&self, cell: Option<&Value>) -> bool {
        match self {
            Self::Contains(needle) if needle.trim().is_empty() => true,
            Self::Contains(needle) => cell.is_some_and(|v| {
                value_text(v)
                    .to_lowercase()
                    .contains(&needle.trim().to_lowercase())
            }),
            Self::Eq(expected) => cell.is_some_and(|v| {
                v == expected || value_text(v).trim() == value_text(expected).trim()
            }),
            Self::Between { from, to } => {
                let Some(cell) = cell.filter(|v| !v.is_null()) else {
                    return false;
                };
                from.as_ref().map_or(true, |b| within(cell, b, true))
                    && to.as_ref().map_or(true, |b| within(cell, b, false))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GridState
// ---------------------------------------------------------------------------

/// Everything a grid needs to request and present one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridState {
    pub pagination: Pagination,
    pub sorter: Option<Sorter>,
    pub filters: BTreeMap<String, FilterValue>,
    pub search: Option<String>,
}

impl GridState {
    /// Query parameters of a list, save or delete call.
    #[must_use]
    pub fn list_query(&self, rut_company: Option<&str>) -> ListQuery {
        ListQuery {
            total: self.pagination.total,
            current: self.pagination.current,
            field: self.sorter.as_ref().map(|s| s.field.clone()),
            order: self.sorter.as_ref().map(|s| s.order),
            search: self.search.clone().filter(|s| !s.is_empty()),
            page_size: self.pagination.page_size,
            rut_company: rut_company.map(str::to_string),
        }
    }

    /// Overwrites the total with the server's count.
    pub fn apply_total(&mut self, total: u64) {
        self.pagination.total = total;
    }

    /// Moves to a page; a different page size restarts at page 1.
    pub fn change_page(&mut self, current: u64, page_size: u64) {
        let page_size = page_size.max(1);
        if page_size == self.pagination.page_size {
            self.pagination.current = current.max(1);
        } else {
            self.pagination.page_size = page_size;
            self.pagination.current = 1;
        }
    }

    /// Sorts by `field`. A click on the active column flips its direction;
    /// there is no return to the unsorted state.
    pub fn sort_by(&mut self, field: &str) -> &Sorter {
        let order = match &self.sorter {
            Some(s) if s.field == field => s.order.toggled(),
            _ => SortOrder::Ascend,
        };
        self.sorter.insert(Sorter {
            field: field.to_string(),
            order,
        })
    }

    /// Sets or clears (`None`) the filter of one column.
    pub fn set_filter(&mut self, field: impl Into<String>, filter: Option<FilterValue>) {
        let field = field.into();
        match filter {
            Some(f) => {
                self.filters.insert(field, f);
            }
            None => {
                self.filters.remove(&field);
            }
        }
    }

    /// Sets the free-text search and restarts at page 1.
    pub fn set_search(&mut self, search: Option<String>) {
        self.search = search.filter(|s| !s.trim().is_empty());
        self.pagination.current = 1;
    }
}
