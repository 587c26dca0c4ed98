//! Controller of a master-detail screen.
//!
//! Owns a [`MasterDetailSession`] behind a lock and drives its network side:
//! the structure fetch on open and the aggregate save. The lock is never held
//! across a request; a response that arrives after the user moved on is
//! discarded by the session itself.

use std::sync::Arc;

use maestro_core::messages::{DetailResponse, DetailSaveResponse};
use maestro_core::session::{ExitDecision, MasterDetailSession, SessionState};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Action, ApiError, ControllerError, ErrorKind};
use crate::notify::{report_failure, Notice};
use crate::options::OptionResolver;
use crate::traits::{Navigator, Notifier, RestApi};

pub const SAVED: &str = "Registro guardado";

pub struct MasterDetailController {
    path: String,
    api: Arc<dyn RestApi>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    options: Option<Arc<OptionResolver>>,
    session: Mutex<MasterDetailSession>,
}

impl MasterDetailController {
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        api: Arc<dyn RestApi>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            path: path.into(),
            api,
            notifier,
            navigator,
            options: None,
            session: Mutex::new(MasterDetailSession::new()),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Arc<OptionResolver>) -> Self {
        self.options = Some(options);
        self
    }

    /// Runs `f` against the session. Local edits (detail rows, header
    /// values, selections) go through here.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut MasterDetailSession) -> R) -> R {
        f(&mut self.session.lock())
    }

    #[must_use]
    pub fn snapshot(&self) -> MasterDetailSession {
        self.session.lock().clone()
    }

    fn details_path(&self, record_id: &str) -> String {
        format!("{}/details/{record_id}", self.path)
    }

    async fn fetch_details(&self, record_id: &str) -> Result<DetailResponse, ApiError> {
        let raw = self.api.get(&self.details_path(record_id), &[]).await?;
        let mut response: DetailResponse = serde_json::from_value(raw)?;
        if let Some(options) = &self.options {
            options.hydrate(&mut response.header_structure).await;
            for tab in &mut response.detail_structure {
                options.hydrate(&mut tab.structure).await;
            }
        }
        Ok(response)
    }

    /// Opens `record_id` (an existing key or the new-record marker) and
    /// loads its structure. Returns `false` when the response was stale.
    ///
    /// # Errors
    ///
    /// Fails while a save is in flight, or with the request error after it
    /// has been reported. A failed fetch returns the session to `Listing`.
    pub async fn open(&self, record_id: &str) -> Result<bool, ControllerError> {
        self.session.lock().open(record_id)?;
        self.navigator.set_record_param(Some(record_id));

        match self.fetch_details(record_id).await {
            Ok(response) => {
                let applied = self.session.lock().apply_details(record_id, response);
                if applied {
                    info!(path = %self.path, record_id, "details loaded");
                }
                Ok(applied)
            }
            Err(err) => {
                {
                    let mut session = self.session.lock();
                    let still_loading = matches!(
                        session.state(),
                        SessionState::Loading { record_id: loading } if loading == record_id
                    );
                    if still_loading {
                        session.exit();
                    }
                }
                report_failure(self.notifier.as_ref(), self.navigator.as_ref(), Action::Load, &err);
                Err(err.into())
            }
        }
    }

    /// Posts the whole aggregate. On success the session and the record
    /// parameter move to the key the backend returned. A save that completes
    /// after the user left the record is still announced; there is no
    /// session left to re-key and `None` is returned.
    ///
    /// # Errors
    ///
    /// Fails outside `Editing`, or with the request error after it has been
    /// reported and kept as the session's last error.
    pub async fn save(&self) -> Result<Option<String>, ControllerError> {
        let plan = self.session.lock().begin_save()?;
        debug!(record_id = %plan.record_id, "saving aggregate");
        let call = self
            .api
            .post(&self.details_path(&plan.record_id), &[], &Value::Object(plan.payload))
            .await
            .and_then(|raw| {
                serde_json::from_value::<DetailSaveResponse>(raw).map_err(ApiError::from)
            });

        match call {
            Ok(response) => {
                self.notifier.notify(Notice::success(SAVED));
                let finished = self.session.lock().finish_save(Ok(response));
                match finished {
                    Ok(record_id) => {
                        if let Some(id) = &record_id {
                            self.navigator.set_record_param(Some(id));
                        }
                        Ok(record_id)
                    }
                    Err(err) => {
                        debug!(error = %err, "record left before its save completed");
                        Ok(None)
                    }
                }
            }
            Err(err) => {
                let message = err
                    .detail()
                    .map_or_else(|| Action::Save.failure_message(), str::to_string);
                if let Err(session_err) = self.session.lock().finish_save(Err(message)) {
                    debug!(error = %session_err, "record left before its save failed");
                }
                match err.kind() {
                    ErrorKind::Unauthorized | ErrorKind::Conflict => report_failure(
                        self.notifier.as_ref(),
                        self.navigator.as_ref(),
                        Action::Save,
                        &err,
                    ),
                    ErrorKind::Failed => debug!(error = %err, "save failed"),
                }
                Err(err.into())
            }
        }
    }

    #[must_use]
    pub fn request_exit(&self) -> ExitDecision {
        self.session.lock().request_exit()
    }

    /// Leaves the record, discarding unsaved edits.
    pub fn exit(&self) {
        self.session.lock().exit();
        self.navigator.set_record_param(None);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use maestro_core::dates::FormValues;
    use maestro_core::NEW_RECORD_ID;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::notify::{MemoryNavigator, MemoryNotifier};
    use crate::traits::QueryPairs;

    #[derive(Default)]
    struct DetailApi {
        posted: Mutex<Vec<(String, Value)>>,
        save_status: Option<u16>,
        fail_get: bool,
        /// Holds the save until `release` fires, after signalling `entered`.
        gated: bool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RestApi for DetailApi {
        async fn get(&self, path: &str, _: &QueryPairs) -> Result<Value, ApiError> {
            if self.fail_get {
                return Err(ApiError::from_status(500, ""));
            }
            assert!(path.starts_with("contratos/details/"));
            Ok(json!({
                "header_pk": "id",
                "header_structure": [
                    {"field": "fecha", "type": "date"},
                    {"field": "total", "type": "number", "persist": false},
                ],
                "header_data": {"fecha": "2024-05-01", "total": 0},
                "detail_structure": [{
                    "name": "items",
                    "label": "Items",
                    "pk": "id_item",
                    "structure": [{"field": "monto", "type": "number"}],
                    "data": [{"id_item": 1, "monto": 10}],
                }],
            }))
        }

        async fn post(&self, path: &str, _: &QueryPairs, body: &Value) -> Result<Value, ApiError> {
            self.posted.lock().push((path.to_string(), body.clone()));
            if self.gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
            match self.save_status {
                Some(status) => Err(ApiError::from_status(status, r#"{"detail": "Monto inválido"}"#)),
                None => Ok(json!({"header_data": {"id": 77, "fecha": "2024-05-02"}})),
            }
        }

        async fn delete(&self, _: &str, _: &QueryPairs, _: &Value) -> Result<Value, ApiError> {
            unreachable!("master-detail never deletes remotely")
        }
    }

    fn controller(api: DetailApi) -> (Arc<DetailApi>, Arc<MemoryNotifier>, Arc<MemoryNavigator>, MasterDetailController) {
        let api = Arc::new(api);
        let notifier = Arc::new(MemoryNotifier::new());
        let navigator = Arc::new(MemoryNavigator::new());
        let controller =
            MasterDetailController::new("contratos", api.clone(), notifier.clone(), navigator.clone());
        (api, notifier, navigator, controller)
    }

    #[tokio::test]
    async fn open_loads_header_and_tabs() {
        let (_, _, navigator, controller) = controller(DetailApi::default());
        assert!(controller.open("5").await.expect("open"));
        let session = controller.snapshot();
        assert_eq!(session.state(), &SessionState::Editing);
        assert_eq!(session.tab("items").expect("items").rows.len(), 1);
        assert_eq!(navigator.record_param().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn failed_open_returns_to_listing() {
        let (_, notifier, _, controller) = controller(DetailApi { fail_get: true, ..DetailApi::default() });
        assert!(controller.open("5").await.is_err());
        assert_eq!(controller.snapshot().state(), &SessionState::Listing);
        assert_eq!(notifier.take()[0].message, "Failed to load");
    }

    #[tokio::test]
    async fn save_of_new_record_rekeys_session_and_route() {
        let (api, notifier, navigator, controller) = controller(DetailApi::default());
        controller.open(NEW_RECORD_ID).await.expect("open");
        controller
            .with_session(|s| {
                let mut values = FormValues::new();
                values.set("monto", json!(25));
                s.add_detail("items", &values)
            })
            .expect("add");

        let id = controller.save().await.expect("save");
        assert_eq!(id.as_deref(), Some("77"));
        assert_eq!(navigator.record_param().as_deref(), Some("77"));
        assert_eq!(controller.snapshot().record_id(), Some("77"));
        assert_eq!(notifier.take()[0].message, SAVED);

        let posted = api.posted.lock();
        assert_eq!(posted[0].0, format!("contratos/details/{NEW_RECORD_ID}"));
        let body = &posted[0].1;
        assert!(body.get("total").is_none());
        assert_eq!(body["items"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn failed_save_keeps_detail_and_editing_state() {
        let (_, notifier, navigator, controller) =
            controller(DetailApi { save_status: Some(422), ..DetailApi::default() });
        controller.open("5").await.expect("open");
        assert!(controller.save().await.is_err());
        let session = controller.snapshot();
        assert_eq!(session.state(), &SessionState::Editing);
        assert_eq!(session.last_error(), Some("Monto inválido"));
        assert_eq!(navigator.logouts(), 0);
        assert!(notifier.take().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_save_forces_logout() {
        let (_, _, navigator, controller) =
            controller(DetailApi { save_status: Some(401), ..DetailApi::default() });
        controller.open("5").await.expect("open");
        assert!(controller.save().await.is_err());
        assert_eq!(navigator.logouts(), 1);
    }

    #[tokio::test]
    async fn save_completing_after_exit_is_still_announced() {
        let (api, notifier, navigator, controller) =
            controller(DetailApi { gated: true, ..DetailApi::default() });
        controller.open("5").await.expect("open");
        let controller = Arc::new(controller);
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.save().await }
        });

        api.entered.notified().await;
        controller.exit();
        api.release.notify_one();

        let id = task.await.expect("join").expect("save");
        assert_eq!(id, None);
        assert_eq!(notifier.take()[0].message, SAVED);
        assert_eq!(controller.snapshot().state(), &SessionState::Listing);
        assert_eq!(navigator.record_param(), None);
    }

    #[tokio::test]
    async fn exit_clears_session_and_route() {
        let (_, _, navigator, controller) = controller(DetailApi::default());
        controller.open("5").await.expect("open");
        assert_eq!(controller.request_exit(), ExitDecision::Immediate);
        controller.exit();
        assert_eq!(controller.snapshot().state(), &SessionState::Listing);
        assert_eq!(navigator.record_param(), None);
    }
}
