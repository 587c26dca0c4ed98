//! Remote select options (`GET selects/{api_ref}`), cached per reference.

use std::collections::HashMap;
use std::sync::Arc;

use maestro_core::field::FieldOption;
use maestro_core::normalize::normalize_options;
use maestro_core::structure::Structure;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::traits::RestApi;

pub struct OptionResolver {
    api: Arc<dyn RestApi>,
    cache: Mutex<HashMap<String, Vec<FieldOption>>>,
}

impl OptionResolver {
    #[must_use]
    pub fn new(api: Arc<dyn RestApi>) -> Self {
        Self { api, cache: Mutex::new(HashMap::new()) }
    }

    /// Options of `api_ref`, fetched once and then served from the cache.
    ///
    /// # Errors
    ///
    /// Propagates the request error; failures are not cached.
    pub async fn resolve(&self, api_ref: &str) -> Result<Vec<FieldOption>, ApiError> {
        if let Some(hit) = self.cache.lock().get(api_ref) {
            return Ok(hit.clone());
        }
        let raw = self.api.get(&format!("selects/{api_ref}"), &[]).await?;
        let options = normalize_options(&raw);
        debug!(api_ref, count = options.len(), "fetched select options");
        self.cache
            .lock()
            .insert(api_ref.to_string(), options.clone());
        Ok(options)
    }

    /// Fills the options of every select in `structure` that declares an
    /// `api_ref` and has no static options. A failed fetch leaves that field
    /// empty and is logged.
    pub async fn hydrate(&self, structure: &mut Structure) {
        let refs: Vec<(String, String)> = structure
            .fields()
            .filter(|d| d.options.is_empty())
            .filter_map(|d| Some((d.field.clone(), d.api_ref.clone()?)))
            .collect();
        for (field, api_ref) in refs {
            match self.resolve(&api_ref).await {
                Ok(options) => {
                    if let Some(descriptor) = structure.find_mut(&field) {
                        descriptor.options = options;
                    }
                }
                Err(err) => warn!(field, api_ref, error = %err, "select options unavailable"),
            }
        }
    }

    pub fn invalidate(&self, api_ref: &str) {
        self.cache.lock().remove(api_ref);
    }
}
