//! Generic service decorators.
//!
//! [`ServiceDecorator`] is the composition point for cross-cutting concerns
//! around a service. [`ApiClientServiceDecorator`] additionally requires and
//! forwards the wrapped service's API client, failing at construction time
//! rather than on first use when the inner service has none.

use crate::client::ApiClient;
use crate::error::{ProviderError, Result};
use crate::service::{GenerativeModel, ModelParams, Service};
use aiservices_core::{ModelMetadata, ServiceMetadata};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pass-through decorator preserving the wrapped service's behavior,
/// including its API-client capability marker.
pub struct ServiceDecorator {
    inner: Arc<dyn Service>,
}

impl ServiceDecorator {
    /// Wrap a service.
    pub fn new(inner: Arc<dyn Service>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Service for ServiceDecorator {
    fn metadata(&self) -> &ServiceMetadata {
        self.inner.metadata()
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        self.inner.list_models().await
    }

    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>> {
        self.inner.get_model(params).await
    }

    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        self.inner.sort_models_by_preference(slugs);
    }

    async fn is_connected(&self) -> Result<bool> {
        self.inner.is_connected().await
    }

    fn api_client(&self) -> Option<&ApiClient> {
        self.inner.api_client()
    }
}

/// Decorator for services that must expose an API client.
///
/// Wrapping a service without one is a configuration error raised here, at
/// construction, never deferred to the first call.
pub struct ApiClientServiceDecorator {
    inner: Arc<dyn Service>,
}

impl std::fmt::Debug for ApiClientServiceDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientServiceDecorator")
            .field("slug", &self.inner.metadata().slug)
            .finish()
    }
}

impl ApiClientServiceDecorator {
    /// Wrap a service, verifying it exposes an API client.
    pub fn new(inner: Arc<dyn Service>) -> Result<Self> {
        if inner.api_client().is_none() {
            return Err(ProviderError::config(format!(
                "service `{}` does not expose an API client",
                inner.metadata().slug
            )));
        }
        Ok(Self { inner })
    }
}

#[async_trait]
impl Service for ApiClientServiceDecorator {
    fn metadata(&self) -> &ServiceMetadata {
        self.inner.metadata()
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        self.inner.list_models().await
    }

    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>> {
        self.inner.get_model(params).await
    }

    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        self.inner.sort_models_by_preference(slugs);
    }

    async fn is_connected(&self) -> Result<bool> {
        self.inner.is_connected().await
    }

    fn api_client(&self) -> Option<&ApiClient> {
        self.inner.api_client()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mistral::MistralService;
    use crate::mock::MockService;
    use crate::service::ContentInput;

    #[test]
    fn test_api_client_decorator_rejects_clientless_service() {
        let mock = Arc::new(MockService::new());
        let err = ApiClientServiceDecorator::new(mock).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_api_client_decorator_accepts_backed_service() {
        let mistral = Arc::new(MistralService::new("test-key").unwrap());
        let decorated = ApiClientServiceDecorator::new(mistral).unwrap();
        assert!(decorated.api_client().is_some());

        // The marker survives further wrapping.
        let rewrapped = ApiClientServiceDecorator::new(Arc::new(decorated)).unwrap();
        assert!(rewrapped.api_client().is_some());
    }

    #[tokio::test]
    async fn test_pass_through_behavior() {
        let mock = Arc::new(MockService::new());
        mock.expect_content("Decorated");
        let decorated = ServiceDecorator::new(mock.clone());

        assert_eq!(decorated.metadata().slug, "mock");

        let model = decorated.get_model(ModelParams::new()).await.unwrap();
        let candidates = model.generate_text(ContentInput::from("Hi")).await.unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some("Decorated"));
        assert_eq!(mock.text_calls(), 1);
    }
}
