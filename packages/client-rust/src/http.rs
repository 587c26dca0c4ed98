//! `reqwest` implementation of [`RestApi`].

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::traits::{QueryPairs, RestApi};

/// HTTP transport for the REST backend.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// Absolute URL of an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &QueryPairs,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%method, %url, "request");
        let mut request = self
            .http
            .request(method, &url)
            .query(query)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), &body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RestApi for HttpApi {
    async fn get(&self, path: &str, query: &QueryPairs) -> Result<Value, ApiError> {
        self.send(Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, query: &QueryPairs, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::POST, path, query, Some(body)).await
    }

    async fn delete(
        &self,
        path: &str,
        query: &QueryPairs,
        body: &Value,
    ) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, query, Some(body)).await
    }
}
