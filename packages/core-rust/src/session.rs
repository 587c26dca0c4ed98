//! Master-detail editing session.
//!
//! One header record plus ordered detail collections ("tabs"), edited
//! locally and persisted as a single aggregate:
//!
//! ```text
//! Listing --open--> Loading --apply_details--> Editing --begin_save--> Saving
//!    ^                                            ^                      |
//!    +-------------------exit---------------------+-----finish_save------+
//! ```
//!
//! Detail rows enter a collection only through [`MasterDetailSession::add_detail`].
//! Editing a row moves it out of its collection into the tab's [`Draft`]
//! slot; re-adding commits it back at its original position and
//! [`MasterDetailSession::cancel_edit`] restores it unchanged.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::dates::FormValues;
use crate::field::{option_label, DataType, FieldOption};
use crate::form::FormModel;
use crate::formula::calculate_field_values;
use crate::messages::{DetailResponse, DetailSaveResponse, DetailTab, NEW_RECORD_ID};
use crate::structure::{build_layouts_data, Structure};
use crate::types::{Layouts, Row};

// ---------------------------------------------------------------------------
// State and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No record selected.
    Listing,
    /// Structure fetch for `record_id` in flight.
    Loading { record_id: String },
    Editing,
    /// Save request in flight.
    Saving,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Loading { .. } => "loading",
            Self::Editing => "editing",
            Self::Saving => "saving",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("operation requires the editing state, session is {0}")]
    NotEditing(&'static str),
    #[error("no save in flight, session is {0}")]
    NotSaving(&'static str),
    #[error("a save is in flight")]
    SaveInFlight,
    #[error("unknown detail tab: {0}")]
    UnknownTab(String),
    #[error("detail tab {0} declares no primary key")]
    MissingPrimaryKey(String),
    #[error("no row with {pk} = {id} in tab {tab}")]
    RowNotFound { tab: String, pk: String, id: String },
    #[error("row {index} out of range in tab {tab}")]
    IndexOutOfRange { tab: String, index: usize },
}

/// Whether leaving the session needs a destructive confirmation first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Immediate,
    NeedsConfirmation,
}

/// What the caller posts to `{path}/details/{record_id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SavePlan {
    pub record_id: String,
    pub payload: Row,
}

// ---------------------------------------------------------------------------
// Detail tabs
// ---------------------------------------------------------------------------

/// A row taken out of its collection for editing.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    /// Position the row held before it was taken.
    pub index: usize,
    pub row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailTabState {
    pub key: String,
    pub title: String,
    pub pk: Option<String>,
    pub structure: Structure,
    pub rows: Vec<Row>,
    pub selection: BTreeSet<usize>,
    pub draft: Option<Draft>,
}

impl DetailTabState {
    fn from_tab(mut tab: DetailTab, seeded: Vec<Row>) -> Option<Self> {
        let key = tab.layout_key()?.to_string();
        let title = tab.title().to_string();
        tab.structure.hide_fields(&tab.hide_detail_fields);
        let rows = if tab.data.is_empty() { seeded } else { tab.data };
        Some(Self {
            key,
            title,
            pk: tab.pk.filter(|pk| !pk.is_empty()),
            structure: tab.structure,
            rows,
            selection: BTreeSet::new(),
            draft: None,
        })
    }

    /// Stores `{field}_label` next to every select value that matches an
    /// option, so grids show text without re-joining.
    fn resolve_select_labels(&self, row: &mut Row) {
        let labels: Vec<(String, String)> = self
            .structure
            .fields()
            .filter(|d| d.data_type == DataType::Select)
            .filter_map(|d| {
                let value = row.get(&d.field)?;
                let label = select_label(&d.options, value)?;
                Some((format!("{}_label", d.field), label))
            })
            .collect();
        for (key, label) in labels {
            row.insert(key, Value::String(label));
        }
    }

    fn position_of(&self, id: &Value) -> Result<usize, SessionError> {
        let pk = self
            .pk
            .as_deref()
            .ok_or_else(|| SessionError::MissingPrimaryKey(self.key.clone()))?;
        let probe = FieldOption { value: id.clone(), label: String::new() };
        self.rows
            .iter()
            .position(|row| row.get(pk).is_some_and(|v| probe.matches(v)))
            .ok_or_else(|| SessionError::RowNotFound {
                tab: self.key.clone(),
                pk: pk.to_string(),
                id: crate::types::value_text(id),
            })
    }
}

/// Label text for a single or multiple select value.
fn select_label(options: &[FieldOption], value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let labels: Vec<&str> = items.iter().filter_map(|v| option_label(options, v)).collect();
            (!labels.is_empty()).then(|| labels.join(", "))
        }
        Value::Null => None,
        v => option_label(options, v).map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// MasterDetailSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MasterDetailSession {
    state: SessionState,
    record_id: Option<String>,
    header_pk: String,
    header_structure: Structure,
    header: FormValues,
    tabs: Vec<DetailTabState>,
    last_error: Option<String>,
}

impl Default for MasterDetailSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterDetailSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Listing,
            record_id: None,
            header_pk: String::new(),
            header_structure: Structure::default(),
            header: FormValues::new(),
            tabs: Vec::new(),
            last_error: None,
        }
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Identifier of the active record; mirrors the query parameter.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.record_id.as_deref() == Some(NEW_RECORD_ID)
    }

    #[must_use]
    pub fn header_pk(&self) -> &str {
        &self.header_pk
    }

    #[must_use]
    pub fn header_structure(&self) -> &Structure {
        &self.header_structure
    }

    #[must_use]
    pub fn header(&self) -> &FormValues {
        &self.header
    }

    #[must_use]
    pub fn tabs(&self) -> &[DetailTabState] {
        &self.tabs
    }

    #[must_use]
    pub fn tab(&self, key: &str) -> Option<&DetailTabState> {
        self.tabs.iter().find(|t| t.key == key)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Header form over the current header values.
    #[must_use]
    pub fn header_form(&self) -> FormModel {
        FormModel::new(&self.header_structure, self.header.clone())
    }

    /// Detail form for a tab, filled from its draft when one is open.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownTab`] for an unknown key.
    pub fn detail_form(&self, key: &str) -> Result<FormModel, SessionError> {
        let tab = self
            .tab(key)
            .ok_or_else(|| SessionError::UnknownTab(key.to_string()))?;
        let values = tab
            .draft
            .as_ref()
            .map(|d| FormValues::from_row(&d.row))
            .unwrap_or_default();
        Ok(FormModel::new(&tab.structure, values))
    }

    fn require_editing(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Editing {
            Ok(())
        } else {
            Err(SessionError::NotEditing(self.state.name()))
        }
    }

    fn tab_mut(&mut self, key: &str) -> Result<&mut DetailTabState, SessionError> {
        self.require_editing()?;
        self.tabs
            .iter_mut()
            .find(|t| t.key == key)
            .ok_or_else(|| SessionError::UnknownTab(key.to_string()))
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts loading `record_id` (`nuevo` for a new aggregate). Any earlier
    /// load in flight is superseded.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SaveInFlight`] while saving.
    pub fn open(&mut self, record_id: impl Into<String>) -> Result<(), SessionError> {
        if self.state == SessionState::Saving {
            return Err(SessionError::SaveInFlight);
        }
        let record_id = record_id.into();
        self.record_id = Some(record_id.clone());
        self.last_error = None;
        self.state = SessionState::Loading { record_id };
        Ok(())
    }

    /// Installs a structure response. Returns `false` and leaves the session
    /// untouched when the response belongs to a record other than the one
    /// being loaded.
    pub fn apply_details(&mut self, record_id: &str, response: DetailResponse) -> bool {
        match &self.state {
            SessionState::Loading { record_id: loading } if loading == record_id => {}
            state => {
                tracing::debug!(
                    response_for = record_id,
                    state = state.name(),
                    "discarding stale detail response"
                );
                return false;
            }
        }
        let DetailResponse {
            header_pk,
            mut header_structure,
            header_data,
            detail_structure,
            hidden_fields,
        } = response;
        header_structure.hide_fields(&hidden_fields);

        let mut layouts = build_layouts_data(&detail_structure, &header_data);
        let tab_keys: Vec<String> = layouts.keys().cloned().collect();
        self.tabs = detail_structure
            .into_iter()
            .filter_map(|tab| {
                let seeded = tab
                    .layout_key()
                    .and_then(|k| layouts.remove(k))
                    .unwrap_or_default();
                DetailTabState::from_tab(tab, seeded)
            })
            .collect();

        let header_row: Row = header_data
            .into_iter()
            .filter(|(k, _)| !tab_keys.contains(k))
            .collect();
        self.header = FormValues::from_row(&header_row);
        self.header_pk = header_pk;
        self.header_structure = header_structure;
        self.last_error = None;
        self.state = SessionState::Editing;
        true
    }

    /// Whether any tab has rows selected.
    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.tabs.iter().any(|t| !t.selection.is_empty())
    }

    #[must_use]
    pub fn request_exit(&self) -> ExitDecision {
        if self.has_selection() {
            ExitDecision::NeedsConfirmation
        } else {
            ExitDecision::Immediate
        }
    }

    /// Back to `Listing`: clears the record identifier, selections and both
    /// forms.
    pub fn exit(&mut self) {
        *self = Self::new();
    }

    // -- header -------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`SessionError::NotEditing`] outside the editing state.
    pub fn set_header_values(&mut self, values: FormValues) -> Result<(), SessionError> {
        self.require_editing()?;
        self.header = values;
        Ok(())
    }

    /// Detail collections keyed by tab, for aggregate fields.
    #[must_use]
    pub fn layouts(&self) -> Layouts {
        self.tabs
            .iter()
            .map(|t| (t.key.clone(), t.rows.clone()))
            .collect()
    }

    /// Recomputes header formula and aggregate fields from the committed
    /// detail rows and returns the computed values.
    pub fn recalculate_header(&mut self) -> Row {
        let computed =
            calculate_field_values(&self.header_structure, &self.header.to_context(), &self.layouts());
        self.header.merge_row(&computed);
        computed
    }

    // -- detail rows --------------------------------------------------------

    /// Commits a detail row. A row taken for editing returns to its original
    /// position; any other row is appended. Returns the row's index.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing` or for an unknown tab.
    pub fn add_detail(&mut self, key: &str, values: &FormValues) -> Result<usize, SessionError> {
        let tab = self.tab_mut(key)?;
        let mut row = values.to_row();
        tab.resolve_select_labels(&mut row);
        let index = match tab.draft.take() {
            Some(draft) => draft.index.min(tab.rows.len()),
            None => tab.rows.len(),
        };
        tab.rows.insert(index, row);
        tab.selection.clear();
        Ok(index)
    }

    /// Takes the row at `index` out of its collection into the draft slot and
    /// returns its form values. `index` addresses the visible rows, which
    /// exclude an open draft; that draft is put back at its own position.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing`, for an unknown tab or an index out of range.
    pub fn edit_detail(&mut self, key: &str, index: usize) -> Result<FormValues, SessionError> {
        let tab = self.tab_mut(key)?;
        if index >= tab.rows.len() {
            return Err(SessionError::IndexOutOfRange { tab: key.to_string(), index });
        }
        let visible = tab.rows.len();
        let row = tab.rows.remove(index);
        let mut position = index;
        if let Some(previous) = tab.draft.take() {
            let slot = previous.index.min(visible);
            if slot <= index {
                tab.rows.insert(slot, previous.row);
                position += 1;
            } else {
                tab.rows.insert(slot - 1, previous.row);
            }
        }
        let values = FormValues::from_row_typed(&row, &tab.structure);
        tab.draft = Some(Draft { index: position, row });
        tab.selection.clear();
        Ok(values)
    }

    /// Puts the draft row back unchanged. Returns `false` when there was none.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing` or for an unknown tab.
    pub fn cancel_edit(&mut self, key: &str) -> Result<bool, SessionError> {
        let tab = self.tab_mut(key)?;
        let Some(draft) = tab.draft.take() else {
            return Ok(false);
        };
        let at = draft.index.min(tab.rows.len());
        tab.rows.insert(at, draft.row);
        Ok(true)
    }

    /// Removes the row whose primary key equals `id`.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing`, for an unknown tab, a tab without a primary
    /// key or when no row matches.
    pub fn remove_detail(&mut self, key: &str, id: &Value) -> Result<Row, SessionError> {
        let tab = self.tab_mut(key)?;
        let index = tab.position_of(id)?;
        tab.selection.clear();
        Ok(tab.rows.remove(index))
    }

    /// Removes the row at `index`; rows not yet saved have no key.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing`, for an unknown tab or an index out of range.
    pub fn remove_detail_at(&mut self, key: &str, index: usize) -> Result<Row, SessionError> {
        let tab = self.tab_mut(key)?;
        if index >= tab.rows.len() {
            return Err(SessionError::IndexOutOfRange { tab: key.to_string(), index });
        }
        tab.selection.clear();
        Ok(tab.rows.remove(index))
    }

    /// Replaces the tab's selection. Out-of-range indices are ignored.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing` or for an unknown tab.
    pub fn select(
        &mut self,
        key: &str,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<(), SessionError> {
        let tab = self.tab_mut(key)?;
        let len = tab.rows.len();
        tab.selection = indices.into_iter().filter(|i| *i < len).collect();
        Ok(())
    }

    /// Removes every selected row of the tab, returning them in order.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing` or for an unknown tab.
    pub fn remove_selected(&mut self, key: &str) -> Result<Vec<Row>, SessionError> {
        let tab = self.tab_mut(key)?;
        let selection = std::mem::take(&mut tab.selection);
        let mut removed: Vec<Row> = selection
            .into_iter()
            .rev()
            .map(|i| tab.rows.remove(i))
            .collect();
        removed.reverse();
        Ok(removed)
    }

    // -- save ---------------------------------------------------------------

    /// Builds the aggregate payload and enters `Saving`.
    ///
    /// Header values go back to wire strings (`YYYY-MM-DD` dates), fields
    /// marked `persist: false` are left out of the header and of every
    /// detail row, and every tab's committed rows
    /// are added under the tab key. Drafts are not committed rows and are not
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotEditing`] outside the editing state.
    pub fn begin_save(&mut self) -> Result<SavePlan, SessionError> {
        self.require_editing()?;
        let mut payload = self.header.to_row();
        for descriptor in self.header_structure.fields().filter(|d| !d.persist) {
            payload.remove(&descriptor.field);
        }
        for tab in &self.tabs {
            let transient: Vec<&str> = tab
                .structure
                .fields()
                .filter(|d| !d.persist)
                .map(|d| d.field.as_str())
                .collect();
            let rows = tab
                .rows
                .iter()
                .map(|row| {
                    let mut row = row.clone();
                    for field in &transient {
                        row.remove(*field);
                    }
                    Value::Object(row)
                })
                .collect();
            payload.insert(tab.key.clone(), Value::Array(rows));
        }
        let record_id = self
            .record_id
            .clone()
            .unwrap_or_else(|| NEW_RECORD_ID.to_string());
        self.last_error = None;
        self.state = SessionState::Saving;
        Ok(SavePlan { record_id, payload })
    }

    /// Completes a save. On success the session is re-keyed to the returned
    /// header key and the header takes the saved values; on failure the
    /// message is kept in [`last_error`](Self::last_error). Either way the
    /// session stays in `Editing`. Returns the new record identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotSaving`] when no save is in flight.
    pub fn finish_save(
        &mut self,
        outcome: Result<DetailSaveResponse, String>,
    ) -> Result<Option<String>, SessionError> {
        if self.state != SessionState::Saving {
            return Err(SessionError::NotSaving(self.state.name()));
        }
        self.state = SessionState::Editing;
        match outcome {
            Ok(response) => {
                if let Some(id) = response.record_id(&self.header_pk) {
                    self.record_id = Some(id);
                }
                if !response.header_data.is_empty() {
                    let saved = FormValues::from_row(&response.header_data);
                    for (field, value) in saved.iter() {
                        self.header.set(field.clone(), value.clone());
                    }
                }
                self.last_error = None;
                Ok(self.record_id.clone())
            }
            Err(message) => {
                self.last_error = Some(message);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dates::FormValue;

    fn response(v: Value) -> DetailResponse {
        serde_json::from_value(v).expect("detail response")
    }

    fn values(v: Value) -> FormValues {
        FormValues::from_row(v.as_object().expect("object"))
    }

    fn editing(record_id: &str) -> MasterDetailSession {
        let mut session = MasterDetailSession::new();
        session.open(record_id).expect("open");
        let applied = session.apply_details(
            record_id,
            response(json!({
                "header_pk": "pk",
                "header_structure": [
                    {"field": "pk", "type": "int"},
                    {"field": "fecha", "type": "date"},
                    {"field": "total", "type": "number", "func_agg": "sum",
                     "fields_agg": ["monto"], "agg_over_layout": "items"},
                    {"field": "tmp", "persist": false},
                ],
                "header_data": {"pk": 7, "fecha": "2024-01-15", "tmp": "x",
                                "cargas": [{"id_carga": 5}]},
                "detail_structure": [
                    {"name": "items", "label": "Items", "pk": "id_item",
                     "structure": [
                        {"field": "id_item", "type": "int"},
                        {"field": "tipo", "type": "select",
                         "options": [{"value": 1, "label": "Bono"}, {"value": 2, "label": "Descuento"}]},
                        {"field": "monto", "type": "number"},
                     ],
                     "data": [{"id_item": 1, "tipo": 1, "monto": 100},
                              {"id_item": 2, "tipo": 2, "monto": 50}]},
                    {"name": "cargas", "pk": "id_carga", "structure": [{"field": "id_carga"}]},
                ],
            })),
        );
        assert!(applied);
        session
    }

    #[test]
    fn apply_details_seeds_header_and_tabs() {
        let session = editing("7");
        assert_eq!(session.state(), &SessionState::Editing);
        assert!(matches!(session.header().get("fecha"), Some(FormValue::Date(_))));
        assert!(session.header().get("cargas").is_none());
        assert_eq!(session.tab("items").expect("items").rows.len(), 2);
        assert_eq!(session.tab("items").expect("items").title, "Items");
        assert_eq!(session.tab("cargas").expect("cargas").rows.len(), 1);
    }

    #[test]
    fn stale_responses_are_ignored() {
        let mut session = MasterDetailSession::new();
        session.open("1").expect("open");
        session.open("2").expect("open");
        let applied = session.apply_details("1", response(json!({"header_pk": "pk"})));
        assert!(!applied);
        assert_eq!(session.state(), &SessionState::Loading { record_id: "2".into() });
        assert!(session.apply_details("2", response(json!({"header_pk": "pk"}))));
        assert!(!session.apply_details("2", response(json!({"header_pk": "pk"}))));
    }

    #[test]
    fn add_then_remove_by_key_restores_collection() {
        let mut session = editing("7");
        let before = session.tab("items").expect("items").rows.clone();
        let cargas_before = session.tab("cargas").expect("cargas").rows.clone();

        session
            .add_detail("items", &values(json!({"id_item": 3, "tipo": 2, "monto": 25})))
            .expect("add");
        let items = &session.tab("items").expect("items").rows;
        assert_eq!(items.len(), before.len() + 1);
        assert_eq!(items[2]["tipo_label"], json!("Descuento"));
        assert_eq!(session.tab("cargas").expect("cargas").rows, cargas_before);

        session.remove_detail("items", &json!(3)).expect("remove");
        assert_eq!(session.tab("items").expect("items").rows, before);
    }

    #[test]
    fn edit_pops_into_draft_and_cancel_restores() {
        let mut session = editing("7");
        let original = session.tab("items").expect("items").rows.clone();

        let form = session.edit_detail("items", 0).expect("edit");
        assert_eq!(form.get("monto"), Some(&FormValue::Json(json!(100))));
        let tab = session.tab("items").expect("items");
        assert_eq!(tab.rows.len(), 1);
        assert_eq!(tab.draft.as_ref().map(|d| d.index), Some(0));
        assert_eq!(session.detail_form("items").expect("form").value("monto"), form.get("monto"));

        assert!(session.cancel_edit("items").expect("cancel"));
        assert_eq!(session.tab("items").expect("items").rows, original);
        assert!(!session.cancel_edit("items").expect("cancel"));
    }

    #[test]
    fn re_adding_an_edited_row_keeps_its_position() {
        let mut session = editing("7");
        let mut form = session.edit_detail("items", 0).expect("edit");
        form.set("monto", json!(120));
        let index = session.add_detail("items", &form).expect("add");
        assert_eq!(index, 0);
        let rows = &session.tab("items").expect("items").rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["monto"], json!(120));
        assert_eq!(rows[0]["tipo_label"], json!("Bono"));
    }

    #[test]
    fn editing_while_a_draft_is_open_takes_the_visible_row() {
        let mut session = editing("7");
        session
            .add_detail("items", &values(json!({"id_item": 3, "tipo": 1, "monto": 10})))
            .expect("add");
        let original = session.tab("items").expect("items").rows.clone();

        session.edit_detail("items", 0).expect("first edit");
        let visible: Vec<Value> = session.tab("items").expect("items").rows.iter().map(|r| r["id_item"].clone()).collect();
        assert_eq!(visible, [json!(2), json!(3)]);

        let form = session.edit_detail("items", 1).expect("second edit");
        assert_eq!(form.get("id_item"), Some(&FormValue::Json(json!(3))));
        let tab = session.tab("items").expect("items");
        let ids: Vec<Value> = tab.rows.iter().map(|r| r["id_item"].clone()).collect();
        assert_eq!(ids, [json!(1), json!(2)]);
        assert_eq!(tab.draft.as_ref().map(|d| d.index), Some(2));

        assert!(session.cancel_edit("items").expect("cancel"));
        assert_eq!(session.tab("items").expect("items").rows, original);
    }

    #[test]
    fn editing_before_an_open_draft_keeps_both_positions() {
        let mut session = editing("7");
        session.edit_detail("items", 1).expect("first edit");
        let form = session.edit_detail("items", 0).expect("second edit");
        assert_eq!(form.get("id_item"), Some(&FormValue::Json(json!(1))));
        let tab = session.tab("items").expect("items");
        assert_eq!(tab.rows[0]["id_item"], json!(2));
        assert_eq!(tab.draft.as_ref().map(|d| d.index), Some(0));
    }

    #[test]
    fn selection_removal_and_exit_confirmation() {
        let mut session = editing("7");
        assert_eq!(session.request_exit(), ExitDecision::Immediate);
        session.select("items", [0, 1, 9]).expect("select");
        assert_eq!(session.tab("items").expect("items").selection.len(), 2);
        assert_eq!(session.request_exit(), ExitDecision::NeedsConfirmation);

        let removed = session.remove_selected("items").expect("remove");
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0]["id_item"], json!(1));
        assert!(session.tab("items").expect("items").rows.is_empty());
        assert_eq!(session.request_exit(), ExitDecision::Immediate);

        session.exit();
        assert_eq!(session.state(), &SessionState::Listing);
        assert!(session.record_id().is_none());
        assert!(session.tabs().is_empty());
    }

    #[test]
    fn unknown_tabs_and_keys_are_errors() {
        let mut session = editing("7");
        assert_eq!(
            session.add_detail("nope", &FormValues::new()),
            Err(SessionError::UnknownTab("nope".into()))
        );
        assert!(matches!(
            session.remove_detail("items", &json!(99)),
            Err(SessionError::RowNotFound { .. })
        ));
        assert!(matches!(
            session.edit_detail("items", 5),
            Err(SessionError::IndexOutOfRange { index: 5, .. })
        ));
    }

    #[test]
    fn detail_edits_require_editing_state() {
        let mut session = MasterDetailSession::new();
        assert_eq!(
            session.add_detail("items", &FormValues::new()),
            Err(SessionError::NotEditing("listing"))
        );
    }

    #[test]
    fn save_payload_merges_header_and_tabs() {
        let mut session = editing("7");
        session.edit_detail("items", 1).expect("edit");
        let plan = session.begin_save().expect("save");
        assert_eq!(session.state(), &SessionState::Saving);
        assert_eq!(plan.record_id, "7");
        assert_eq!(plan.payload["fecha"], json!("2024-01-15"));
        assert!(!plan.payload.contains_key("tmp"));
        assert_eq!(plan.payload["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(plan.payload["cargas"], json!([{"id_carga": 5}]));
    }

    #[test]
    fn save_payload_drops_transient_detail_fields() {
        let mut session = MasterDetailSession::new();
        session.open("3").expect("open");
        assert!(session.apply_details(
            "3",
            response(json!({
                "header_pk": "pk",
                "header_data": {"pk": 3},
                "detail_structure": [{
                    "name": "items",
                    "pk": "id_item",
                    "structure": [
                        {"field": "monto", "type": "number"},
                        {"field": "subtotal", "type": "number", "persist": false},
                    ],
                    "data": [{"id_item": 1, "monto": 10, "subtotal": 10}],
                }],
            })),
        ));
        let plan = session.begin_save().expect("save");
        assert_eq!(plan.payload["items"], json!([{"id_item": 1, "monto": 10}]));
    }

    #[test]
    fn saving_new_record_rekeys_and_stays_editing() {
        let mut session = editing(NEW_RECORD_ID);
        assert!(session.is_new());
        let plan = session.begin_save().expect("save");
        assert_eq!(plan.record_id, "nuevo");

        let saved: DetailSaveResponse =
            serde_json::from_value(json!({"header_data": {"pk": 42}})).expect("response");
        let id = session.finish_save(Ok(saved)).expect("finish");
        assert_eq!(id.as_deref(), Some("42"));
        assert_eq!(session.record_id(), Some("42"));
        assert_eq!(session.state(), &SessionState::Editing);
        assert!(!session.is_new());
    }

    #[test]
    fn failed_save_keeps_editing_with_error() {
        let mut session = editing("7");
        session.begin_save().expect("save");
        let id = session
            .finish_save(Err("RUT duplicado".into()))
            .expect("finish");
        assert_eq!(id, None);
        assert_eq!(session.state(), &SessionState::Editing);
        assert_eq!(session.last_error(), Some("RUT duplicado"));
        assert_eq!(session.record_id(), Some("7"));
        assert!(matches!(session.finish_save(Err(String::new())), Err(SessionError::NotSaving(_))));
    }

    #[test]
    fn header_aggregates_follow_detail_rows() {
        let mut session = editing("7");
        assert_eq!(session.recalculate_header()["total"], json!(150));
        session
            .add_detail("items", &values(json!({"monto": 25})))
            .expect("add");
        assert_eq!(session.recalculate_header()["total"], json!(175));
        assert_eq!(session.header().get("total"), Some(&FormValue::Json(json!(175))));
    }
}
