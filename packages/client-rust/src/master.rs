//! Controller of a master (single-entity list + form) screen.
//!
//! Every list, save and delete call carries the grid's query parameters and
//! answers with a full list response, which replaces the page and the
//! server-authoritative total.

use std::sync::Arc;

use maestro_core::dates::FormValues;
use maestro_core::form::FormModel;
use maestro_core::messages::ListResponse;
use maestro_core::query::Sorter;
use maestro_core::structure::Structure;
use maestro_core::table::{TableModel, TableOptions};
use maestro_core::types::Row;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

use crate::error::{Action, ApiError};
use crate::grid_state::GridStateHandle;
use crate::notify::{report_failure, Notice};
use crate::options::OptionResolver;
use crate::traits::{Navigator, Notifier, RestApi};

pub const SAVED: &str = "Registro guardado";
pub const DELETED: &str = "Registro eliminado";

/// The page currently shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterPage {
    pub rows: Vec<Row>,
    pub structure: Structure,
    pub total: u64,
}

pub struct MasterController {
    path: String,
    api: Arc<dyn RestApi>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    grid: GridStateHandle,
    rut_company: Option<String>,
    options: Option<Arc<OptionResolver>>,
    page: Mutex<MasterPage>,
}

impl MasterController {
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        api: Arc<dyn RestApi>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        grid: GridStateHandle,
    ) -> Self {
        Self {
            path: path.into(),
            api,
            notifier,
            navigator,
            grid,
            rut_company: None,
            options: None,
            page: Mutex::new(MasterPage::default()),
        }
    }

    #[must_use]
    pub fn with_rut_company(mut self, rut_company: Option<String>) -> Self {
        self.rut_company = rut_company;
        self
    }

    /// Resolves remote select options of every loaded structure.
    #[must_use]
    pub fn with_options(mut self, options: Arc<OptionResolver>) -> Self {
        self.options = Some(options);
        self
    }

    #[must_use]
    pub fn grid(&self) -> &GridStateHandle {
        &self.grid
    }

    #[must_use]
    pub fn page(&self) -> MasterPage {
        self.page.lock().clone()
    }

    fn query(&self) -> Vec<(String, String)> {
        self.grid
            .read(|s| s.list_query(self.rut_company.as_deref()))
            .to_pairs()
    }

    async fn apply(&self, raw: Value) -> Result<(), ApiError> {
        let mut response: ListResponse = serde_json::from_value(raw)?;
        if let Some(options) = &self.options {
            options.hydrate(&mut response.form).await;
        }
        self.grid.update(|s| s.apply_total(response.total));
        let mut page = self.page.lock();
        page.rows = response.data;
        page.total = response.total;
        if !response.form.is_empty() {
            page.structure = response.form;
        }
        Ok(())
    }

    async fn run(&self, action: Action, call: Result<Value, ApiError>) -> Result<(), ApiError> {
        let result = match call {
            Ok(raw) => self.apply(raw).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            report_failure(self.notifier.as_ref(), self.navigator.as_ref(), action, err);
        }
        result
    }

    /// Fetches the current page.
    ///
    /// # Errors
    ///
    /// Returns the request error after it has been reported.
    pub async fn load(&self) -> Result<(), ApiError> {
        let query = self.query();
        let call = self.api.get(&self.path, &query).await;
        self.run(Action::Load, call).await?;
        info!(path = %self.path, total = self.page.lock().total, "page loaded");
        Ok(())
    }

    /// Saves form values. When editing, `key` carries the primary key field
    /// and value of the edited row. Fields marked `persist: false` are not
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns the request error after it has been reported.
    pub async fn save(&self, values: &FormValues, key: Option<(&str, Value)>) -> Result<(), ApiError> {
        let mut body = values.to_row();
        {
            let page = self.page.lock();
            for descriptor in page.structure.fields().filter(|d| !d.persist) {
                body.remove(&descriptor.field);
            }
        }
        if let Some((pk, id)) = key {
            body.insert(pk.to_string(), id);
        }
        let query = self.query();
        let call = self.api.post(&self.path, &query, &Value::Object(body)).await;
        self.run(Action::Save, call).await?;
        self.notifier.notify(Notice::success(SAVED));
        Ok(())
    }

    /// Deletes a row. Callers confirm first.
    ///
    /// # Errors
    ///
    /// Returns the request error after it has been reported.
    pub async fn delete(&self, row: &Row) -> Result<(), ApiError> {
        let query = self.query();
        let call = self
            .api
            .delete(&self.path, &query, &Value::Object(row.clone()))
            .await;
        self.run(Action::Delete, call).await?;
        self.notifier.notify(Notice::success(DELETED));
        Ok(())
    }

    /// Grid change (page, page size, sorter) followed by a reload.
    ///
    /// # Errors
    ///
    /// Returns the reload error after it has been reported.
    pub async fn change(
        &self,
        current: u64,
        page_size: u64,
        sorter: Option<Sorter>,
    ) -> Result<(), ApiError> {
        self.grid.update(|s| {
            s.change_page(current, page_size);
            if sorter.is_some() {
                s.sorter = sorter;
            }
        });
        self.load().await
    }

    /// Free-text search from page 1.
    ///
    /// # Errors
    ///
    /// Returns the reload error after it has been reported.
    pub async fn search(&self, text: &str) -> Result<(), ApiError> {
        self.grid.update(|s| s.set_search(Some(text.to_string())));
        self.load().await
    }

    /// Column configuration of the current page.
    #[must_use]
    pub fn table(&self, options: TableOptions) -> TableModel {
        let page = self.page.lock();
        TableModel::derive(&page.structure, &page.rows, options)
    }

    /// Form for a new row, or for editing `row` with its dates converted.
    #[must_use]
    pub fn form(&self, row: Option<&Row>) -> FormModel {
        let values = row.map(TableModel::edit_values).unwrap_or_default();
        FormModel::new(&self.page.lock().structure, values)
    }
}
