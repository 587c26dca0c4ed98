//! Maestro Core — metadata-driven forms, grids, formulas and master-detail sessions.

pub mod dates;
pub mod field;
pub mod form;
pub mod formula;
pub mod messages;
pub mod normalize;
pub mod query;
pub mod rut;
pub mod session;
pub mod structure;
pub mod table;
pub mod types;

pub use dates::{FormValue, FormValues};
pub use field::{AggregateFn, DataType, FieldDescriptor, FieldOption};
pub use form::{BlurEvent, Control, ControlKind, EnterOutcome, FieldError, FormLayout, FormModel};
pub use formula::{calculate_field_values, evaluate, evaluate_aggregate, Formula};
pub use messages::{
    DetailResponse, DetailSaveResponse, DetailTab, ListQuery, ListResponse, NEW_RECORD_ID,
};
pub use normalize::normalize;
pub use query::{FilterValue, GridState, Pagination, SortOrder, Sorter};
pub use rut::{format_rut, is_valid_rut, validate_rut_input};
pub use session::{
    DetailTabState, Draft, ExitDecision, MasterDetailSession, SavePlan, SessionError, SessionState,
};
pub use structure::{build_layouts_data, Group, Structure};
pub use table::{Cell, Column, ContextMenu, FileEndpoint, TableModel, TableOptions};
pub use types::{Layouts, Row};

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_response_drives_table_and_form() {
        let response: ListResponse = serde_json::from_value(json!({
            "data": [{"id": 1, "name": "Ana"}],
            "form": [{"field": "name", "in_table": true, "in_form": true}],
            "total": 1,
        }))
        .expect("list response");

        let table = TableModel::derive(&response.form, &response.data, TableOptions::default());
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.columns()[0].title, "Name");
        assert_eq!(table.render_row(&response.data[0])[0].text(), "Ana");

        let form = FormModel::new(&response.form, FormValues::new());
        assert_eq!(form.controls().len(), 1);
        assert_eq!(form.controls()[0].field, "name");
        assert_eq!(form.controls()[0].kind, ControlKind::Text);
    }
}
