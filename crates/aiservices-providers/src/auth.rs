//! Credential strategies for outgoing provider requests.

use crate::error::{ProviderError, Result};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

/// Which header carries the API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHeader {
    /// `Authorization: Bearer <key>` (the default for OpenAI-compatible
    /// providers).
    Bearer,
    /// A provider-specific header carrying the bare key.
    Custom(&'static str),
}

/// API-key authentication.
///
/// Attaches the key to outgoing requests; persistence of the key is the
/// option layer's concern, and [`ApiKey::option_name`] tells it which option
/// to store the key under.
#[derive(Clone)]
pub struct ApiKey {
    key: SecretString,
    header: AuthHeader,
}

impl ApiKey {
    /// Create a bearer-token strategy. The key must be non-empty.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ProviderError::config("API key is required"));
        }
        Ok(Self {
            key: SecretString::new(key),
            header: AuthHeader::Bearer,
        })
    }

    /// Carry the key in a provider-specific header instead of
    /// `Authorization`.
    pub fn with_header(mut self, name: &'static str) -> Self {
        self.header = AuthHeader::Custom(name);
        self
    }

    /// Attach the credential to an outgoing request.
    pub fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        match self.header {
            AuthHeader::Bearer => request.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.key.expose_secret()),
            ),
            AuthHeader::Custom(name) => request.header(name, self.key.expose_secret()),
        }
    }

    /// The option the external option layer persists this service's key
    /// under.
    pub fn option_name(service_slug: &str) -> String {
        format!("ais_{service_slug}_api_key")
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("key", &"[redacted]")
            .field("header", &self.header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(ApiKey::new("").is_err());
        assert!(ApiKey::new("sk-test").is_ok());
    }

    #[test]
    fn test_option_name() {
        assert_eq!(ApiKey::option_name("mistral"), "ais_mistral_api_key");
    }

    #[test]
    fn test_debug_redacts_key() {
        let auth = ApiKey::new("sk-very-secret").unwrap();
        let debug = format!("{auth:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[redacted]"));
    }
}
