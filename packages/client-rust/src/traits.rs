use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::notify::Notice;

/// Query parameters as ordered `key=value` pairs.
pub type QueryPairs = [(String, String)];

/// The REST backend. Paths are relative to the API root (`empleados`,
/// `empleados/details/nuevo`, `selects/cargos`).
#[async_trait]
pub trait RestApi: Send + Sync {
    /// `GET path?query`.
    async fn get(&self, path: &str, query: &QueryPairs) -> Result<Value, ApiError>;

    /// `POST path?query` with a JSON body.
    async fn post(&self, path: &str, query: &QueryPairs, body: &Value) -> Result<Value, ApiError>;

    /// `DELETE path?query` with a JSON body.
    async fn delete(&self, path: &str, query: &QueryPairs, body: &Value)
        -> Result<Value, ApiError>;
}

/// Toast/notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Router side effects a controller may trigger.
pub trait Navigator: Send + Sync {
    /// Sets (or clears, with `None`) the query parameter naming the active
    /// master-detail record.
    fn set_record_param(&self, record_id: Option<&str>);

    /// Ends the session and redirects to the login screen.
    fn force_logout(&self);
}
