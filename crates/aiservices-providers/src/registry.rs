//! Service lookup by slug or by required capabilities.

use crate::error::{ProviderError, Result};
use crate::service::Service;
use aiservices_core::capability::{model_slugs_for_capabilities, Capability};
use std::sync::Arc;
use tracing::warn;

/// An ordered collection of registered services.
///
/// Registration order is priority order: capability lookup walks the
/// services as registered and returns the first one with a satisfying
/// model.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<dyn Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Slugs must be unique.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<()> {
        let slug = service.metadata().slug.clone();
        if self.services.iter().any(|s| s.metadata().slug == slug) {
            return Err(ProviderError::config(format!(
                "a service with slug `{slug}` is already registered"
            )));
        }
        self.services.push(service);
        Ok(())
    }

    /// Look up a service by slug.
    pub fn get(&self, slug: &str) -> Option<Arc<dyn Service>> {
        self.services
            .iter()
            .find(|s| s.metadata().slug == slug)
            .cloned()
    }

    /// Registered slugs, in priority order.
    pub fn slugs(&self) -> Vec<&str> {
        self.services
            .iter()
            .map(|s| s.metadata().slug.as_str())
            .collect()
    }

    /// The first registered service with at least one model covering
    /// `required`.
    ///
    /// A service whose listing fails is skipped rather than aborting the
    /// scan; finding no satisfying service is a typed error, never a silent
    /// substitution.
    pub async fn get_for_capabilities(
        &self,
        required: &[Capability],
    ) -> Result<Arc<dyn Service>> {
        for service in &self.services {
            match service.list_models().await {
                Ok(models) => {
                    if !model_slugs_for_capabilities(&models, required).is_empty() {
                        return Ok(Arc::clone(service));
                    }
                }
                Err(e) => {
                    warn!(
                        service = %service.metadata().slug,
                        "Skipping service whose model listing failed: {e}"
                    );
                }
            }
        }

        let wanted = required
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(ProviderError::no_available_service(format!(
            "no registered service has a model with capabilities: {wanted}"
        )))
    }
}
