//! Transient caching for model listings.
//!
//! Enumerating models is the expensive, rate-limited provider call;
//! constructing a model is cheap. [`CachedService`] therefore wraps only
//! `list_models()`, storing the serialized listing in a [`TransientStore`]
//! under a short-lived key. Cached listings are re-derivable data, so
//! last-writer-wins semantics in the store are acceptable.

use crate::client::ApiClient;
use crate::error::Result;
use crate::service::{GenerativeModel, ModelParams, Service};
use aiservices_core::{ModelMetadata, ServiceMetadata};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default lifetime of a cached model listing.
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A string key-value store with expiring entries.
///
/// Mirrors the external transient store the hosting application provides;
/// [`InMemoryTransients`] is the in-process default.
pub trait TransientStore: Send + Sync {
    /// Fetch a live entry.
    fn get(&self, key: &str) -> Option<String>;

    /// Store an entry for `ttl`.
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Remove an entry.
    fn delete(&self, key: &str);
}

/// Process-local transient store.
#[derive(Default)]
pub struct InMemoryTransients {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl InMemoryTransients {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransientStore for InMemoryTransients {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((expires_at, value)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
    }

    fn delete(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

/// A service decorator caching `list_models()` in a transient store.
///
/// Everything else passes through to the wrapped service; `get_model()` in
/// particular stays uncached.
pub struct CachedService {
    inner: Arc<dyn Service>,
    store: Arc<dyn TransientStore>,
    ttl: Duration,
}

impl CachedService {
    /// Wrap `inner`, caching listings in `store` for the default TTL.
    pub fn new(inner: Arc<dyn Service>, store: Arc<dyn TransientStore>) -> Self {
        Self {
            inner,
            store,
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the cache lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cache_key(&self) -> String {
        format!("ais_{}_models", self.inner.metadata().slug)
    }
}

#[async_trait]
impl Service for CachedService {
    fn metadata(&self) -> &ServiceMetadata {
        self.inner.metadata()
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        let key = self.cache_key();

        if let Some(cached) = self.store.get(&key) {
            match serde_json::from_str(&cached) {
                Ok(models) => {
                    debug!(%key, "Model listing served from cache");
                    return Ok(models);
                }
                Err(e) => {
                    warn!(%key, "Dropping unreadable cached model listing: {e}");
                    self.store.delete(&key);
                }
            }
        }

        let models = self.inner.list_models().await?;
        self.store
            .set(&key, serde_json::to_string(&models)?, self.ttl);
        Ok(models)
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
