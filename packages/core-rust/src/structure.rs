//! Field structures: the three layout shapes the backend sends and the
//! single fold that reduces any of them to a flat descriptor list.
//!
//! Raw metadata arrives as a flat array of field objects, an object of named
//! groups, or an array of rows (flex grid). It may nest further; [`Node`]
//! captures the raw tree with one structural predicate (an object exposing
//! `field` or `name` is a leaf) and [`Structure`] is the shape-tagged result.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::field::FieldDescriptor;
use crate::messages::DetailTab;
use crate::normalize::normalize;
use crate::types::{Layouts, Row};

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Raw metadata tree, before shape classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Box<FieldDescriptor>),
    Seq(Vec<Node>),
    Groups(Vec<(String, Node)>),
}

impl Node {
    /// Folds a JSON value into a node tree. Leaves that fail normalization
    /// and stray scalars become empty sequences.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(obj) if is_leaf(obj) => normalize(value)
                .map_or_else(|| Self::Seq(Vec::new()), |d| Self::Leaf(Box::new(d))),
            Value::Object(obj) => Self::Groups(
                obj.iter()
                    .map(|(name, child)| (name.clone(), Self::from_json(child)))
                    .collect(),
            ),
            Value::Array(items) => Self::Seq(items.iter().map(Self::from_json).collect()),
            _ => Self::Seq(Vec::new()),
        }
    }

    /// Depth-first, declaration-order fold of all leaves.
    pub fn collect_leaves(self, out: &mut Vec<FieldDescriptor>) {
        match self {
            Self::Leaf(d) => out.push(*d),
            Self::Seq(children) => children.into_iter().for_each(|c| c.collect_leaves(out)),
            Self::Groups(groups) => groups.into_iter().for_each(|(_, c)| c.collect_leaves(out)),
        }
    }

    fn into_leaves(self) -> Vec<FieldDescriptor> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }
}

fn is_leaf(obj: &Map<String, Value>) -> bool {
    obj.contains_key("field") || obj.contains_key("name")
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// A named, headed section of a grouped form.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Field container in one of the three layout shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// Plain list of fields.
    Flat(Vec<FieldDescriptor>),
    /// Named vertical groups, each rendered with a heading.
    Grouped(Vec<Group>),
    /// Rows of equal-flex items.
    Grid(Vec<Vec<FieldDescriptor>>),
}

impl Default for Structure {
    fn default() -> Self {
        Self::Flat(Vec::new())
    }
}

impl Structure {
    /// Parses raw metadata of any shape.
    ///
    /// Field names are unique across the result: the first declaration of a
    /// name wins and later ones are dropped.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let mut structure = Self::from_node(Node::from_json(value));
        structure.dedupe();
        structure
    }

    /// Classifies a node tree. A sequence holding only leaves is flat; a
    /// sequence holding any nested container is a grid whose rows are the
    /// flattened children; named groups stay grouped.
    #[must_use]
    pub fn from_node(node: Node) -> Self {
        match node {
            Node::Leaf(d) => Self::Flat(vec![*d]),
            Node::Groups(groups) => Self::Grouped(
                groups
                    .into_iter()
                    .map(|(name, child)| Group { name, fields: child.into_leaves() })
                    .collect(),
            ),
            Node::Seq(children) => {
                let children: Vec<Node> = children
                    .into_iter()
                    .filter(|c| !matches!(c, Node::Seq(items) if items.is_empty()))
                    .collect();
                if children.iter().all(|c| matches!(c, Node::Leaf(_))) {
                    Self::Flat(Node::Seq(children).into_leaves())
                } else {
                    Self::Grid(
                        children
                            .into_iter()
                            .map(Node::into_leaves)
                            .filter(|row| !row.is_empty())
                            .collect(),
                    )
                }
            }
        }
    }

    fn dedupe(&mut self) {
        let mut seen = HashSet::new();
        let mut keep = |d: &FieldDescriptor| {
            let fresh = seen.insert(d.field.clone());
            if !fresh {
                tracing::debug!(field = %d.field, "dropping duplicate field descriptor");
            }
            fresh
        };
        match self {
            Self::Flat(fields) => fields.retain(|d| keep(d)),
            Self::Grouped(groups) => groups.iter_mut().for_each(|g| g.fields.retain(|d| keep(d))),
            Self::Grid(rows) => rows.iter_mut().for_each(|r| r.retain(|d| keep(d))),
        }
    }

    /// All descriptors in declaration order, regardless of shape.
    pub fn fields(&self) -> Box<dyn Iterator<Item = &FieldDescriptor> + '_> {
        match self {
            Self::Flat(fields) => Box::new(fields.iter()),
            Self::Grouped(groups) => Box::new(groups.iter().flat_map(|g| g.fields.iter())),
            Self::Grid(rows) => Box::new(rows.iter().flatten()),
        }
    }

    /// Mutable access to all descriptors in declaration order.
    pub fn fields_mut(&mut self) -> Box<dyn Iterator<Item = &mut FieldDescriptor> + '_> {
        match self {
            Self::Flat(fields) => Box::new(fields.iter_mut()),
            Self::Grouped(groups) => Box::new(groups.iter_mut().flat_map(|g| g.fields.iter_mut())),
            Self::Grid(rows) => Box::new(rows.iter_mut().flatten()),
        }
    }

    /// Owned flat list of all descriptors in declaration order.
    #[must_use]
    pub fn flatten(&self) -> Vec<FieldDescriptor> {
        self.fields().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }

    #[must_use]
    pub fn find(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields().find(|d| d.field == field)
    }

    pub fn find_mut(&mut self, field: &str) -> Option<&mut FieldDescriptor> {
        self.fields_mut().find(|d| d.field == field)
    }

    /// Keeps the shape while dropping descriptors rejected by `keep`.
    /// Groups and rows left empty are pruned entirely.
    #[must_use]
    pub fn filter(&self, keep: impl Fn(&FieldDescriptor) -> bool) -> Self {
        let pick = |fields: &[FieldDescriptor]| -> Vec<FieldDescriptor> {
            fields.iter().filter(|d| keep(*d)).cloned().collect()
        };
        match self {
            Self::Flat(fields) => Self::Flat(pick(fields.as_slice())),
            Self::Grouped(groups) => Self::Grouped(
                groups
                    .iter()
                    .map(|g| Group { name: g.name.clone(), fields: pick(g.fields.as_slice()) })
                    .filter(|g| !g.fields.is_empty())
                    .collect(),
            ),
            Self::Grid(rows) => Self::Grid(
                rows.iter()
                    .map(|row| pick(row.as_slice()))
                    .filter(|row| !row.is_empty())
                    .collect(),
            ),
        }
    }

    /// Fields rendered in a form: `visible && in_form`.
    #[must_use]
    pub fn filter_form_structure(&self) -> Self {
        self.filter(FieldDescriptor::shown_in_form)
    }

    /// Fields rendered as grid columns: `in_table || field_show`.
    #[must_use]
    pub fn filter_table_structure(&self) -> Self {
        self.filter(FieldDescriptor::shown_in_table)
    }

    /// Hides the named fields from both the form and the grid.
    pub fn hide_fields(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        for descriptor in self.fields_mut() {
            if names.iter().any(|n| n == &descriptor.field) {
                descriptor.visible = false;
                descriptor.in_table = false;
            }
        }
    }

    /// Serializes back to the raw metadata shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let raw_list = |fields: &[FieldDescriptor]| -> Value {
            Value::Array(fields.iter().map(FieldDescriptor::to_raw).collect())
        };
        match self {
            Self::Flat(fields) => raw_list(fields.as_slice()),
            Self::Grouped(groups) => Value::Object(
                groups
                    .iter()
                    .map(|g| (g.name.clone(), raw_list(g.fields.as_slice())))
                    .collect(),
            ),
            Self::Grid(rows) => Value::Array(rows.iter().map(|r| raw_list(r.as_slice())).collect()),
        }
    }
}

impl Serialize for Structure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Structure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&raw))
    }
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Associates each detail tab's key with its row collection in `data`.
///
/// The tab key is the first of `layout_mr`, `name`, `id`, `key` present on
/// the tab. Missing or non-array collections default to an empty list.
#[must_use]
pub fn build_layouts_data(tabs: &[DetailTab], data: &Row) -> Layouts {
    tabs.iter()
        .filter_map(|tab| {
            let key = tab.layout_key()?;
            let rows = data
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|r| r.as_object().cloned()).collect())
                .unwrap_or_default();
            Some((key.to_string(), rows))
        })
        .collect()
}
