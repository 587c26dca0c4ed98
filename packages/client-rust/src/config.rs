//! Client configuration.

use std::time::Duration;

use maestro_core::query::{GridState, Pagination, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_SIZE_OPTIONS};
use maestro_core::table::FileEndpoint;

/// Connection and grid defaults shared by every controller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API root, e.g. `https://rrhh.example.cl/api`. Request paths and
    /// the `files/` endpoint are joined onto it.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Company scope added to list queries as `rut_company`.
    pub rut_company: Option<String>,
    /// Maximum time to wait for a response.
    pub request_timeout: Duration,
    /// Rows per page of a fresh grid.
    pub page_size: u64,
    pub page_size_options: Vec<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            token: None,
            rut_company: None,
            request_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
        }
    }
}

impl ClientConfig {
    /// File endpoint rooted at the API base.
    #[must_use]
    pub fn files(&self) -> FileEndpoint {
        FileEndpoint::new(self.base_url.trim_end_matches('/'))
    }

    /// Grid state for a new grid with the configured page size.
    #[must_use]
    pub fn grid_state(&self) -> GridState {
        GridState {
            pagination: Pagination {
                page_size: self.page_size.max(1),
                page_size_options: self.page_size_options.clone(),
                ..Pagination::default()
            },
            ..GridState::default()
        }
    }
}
