//! Wire shapes exchanged with the REST backend.
//!
//! Field names match the backend's snake_case JSON exactly. Collections the
//! backend may send as `null` deserialize to their empty default.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::query::SortOrder;
use crate::structure::Structure;
use crate::types::{value_text, Row};

/// Sentinel record identifier for a master-detail aggregate not yet created.
pub const NEW_RECORD_ID: &str = "nuevo";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifier-like fields arrive as strings, numbers or `null`; scalars are
/// kept as text, anything else reads as absent.
fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
            Some(value_text(&value))
        }
        _ => None,
    })
}

fn scalar_text_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Master (list) screens
// ---------------------------------------------------------------------------

/// Query parameters sent with every list, save and delete call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub total: u64,
    pub current: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub page_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rut_company: Option<String>,
}

impl ListQuery {
    /// Flattens to `key=value` pairs in wire order, omitting absent values.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("total".to_string(), self.total.to_string()),
            ("current".to_string(), self.current.to_string()),
        ];
        let optional = [
            ("field", self.field.clone()),
            ("order", self.order.map(|o| o.as_str().to_string())),
            ("search", self.search.clone()),
        ];
        pairs.extend(optional.into_iter().filter_map(|(k, v)| Some((k.to_string(), v?))));
        pairs.push(("page_size".to_string(), self.page_size.to_string()));
        if let Some(rut) = &self.rut_company {
            pairs.push(("rut_company".to_string(), rut.clone()));
        }
        pairs
    }
}

/// Response of a list, save or delete call on a master screen.
///
/// `total` is server-authoritative and replaces the grid's pagination total
/// after every call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Row>,
    #[serde(default)]
    pub form: Structure,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Master-detail screens
// ---------------------------------------------------------------------------

/// One dependent collection ("tab") of a master-detail aggregate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailTab {
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub layout_mr: Option<String>,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Primary-key field of the detail rows.
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub pk: Option<String>,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Row>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hide_detail_fields: Vec<String>,
}

impl DetailTab {
    /// Key under which this tab's rows live: `layout_mr`, `name`, `id`, `key`,
    /// first present wins.
    #[must_use]
    pub fn layout_key(&self) -> Option<&str> {
        [&self.layout_mr, &self.name, &self.id, &self.key]
            .into_iter()
            .find_map(|k| k.as_deref().filter(|k| !k.is_empty()))
    }

    /// Tab heading, falling back to the key.
    #[must_use]
    pub fn title(&self) -> &str {
        self.label
            .as_deref()
            .or_else(|| self.layout_key())
            .unwrap_or_default()
    }
}

/// Response of `GET {path}/details/{id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailResponse {
    /// Primary-key field of the header record.
    #[serde(default, deserialize_with = "scalar_text_or_default")]
    pub header_pk: String,
    #[serde(default)]
    pub header_structure: Structure,
    #[serde(default, deserialize_with = "null_as_default")]
    pub header_data: Row,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail_structure: Vec<DetailTab>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hidden_fields: Vec<String>,
}

/// Response of `POST {path}/details/{id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailSaveResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub header_data: Row,
    #[serde(flatten)]
    pub extra: Row,
}

impl DetailSaveResponse {
    /// The saved header's identifier under `pk`, rendered as a path segment.
    #[must_use]
    pub fn record_id(&self, pk: &str) -> Option<String> {
        match self.header_data.get(pk)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
