//! Metadata describing services and the models they expose.

use crate::capability::Capability;
use serde::{Deserialize, Serialize};

/// Metadata for one model within a service.
///
/// Constructed fresh on every `list_models()` call from provider responses
/// or hardcoded tables; never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Provider-specific model identifier, unique within the service.
    pub slug: String,

    /// Display name; derived from the slug when the provider omits one.
    pub name: String,

    /// What the model can do, in the common capability vocabulary.
    pub capabilities: Vec<Capability>,
}

impl ModelMetadata {
    /// Create metadata. An empty `name` is replaced with a display name
    /// derived from the slug.
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        mut capabilities: Vec<Capability>,
    ) -> Self {
        let slug = slug.into();
        let name = name.into();
        let name = if name.is_empty() {
            display_name_from_slug(&slug)
        } else {
            name
        };
        capabilities.sort();
        capabilities.dedup();
        Self {
            slug,
            name,
            capabilities,
        }
    }

    /// Whether this model covers every capability in `required`.
    pub fn supports(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

/// Derive a human-readable display name from a model slug.
fn display_name_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where a service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// A third-party cloud API.
    Cloud,
    /// An API hosted alongside the application.
    Server,
    /// An in-process implementation (e.g. the mock service).
    Client,
}

/// Metadata describing a provider integration, independent of its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    /// Service identifier, unique within a registry.
    pub slug: String,

    /// Display name.
    pub name: String,

    /// Where the service runs.
    pub kind: ServiceKind,

    /// Where to obtain credentials for the service.
    pub credentials_url: String,
}

impl ServiceMetadata {
    /// Create service metadata.
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        kind: ServiceKind,
        credentials_url: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            kind,
            credentials_url: credentials_url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_derived_from_slug() {
        let metadata = ModelMetadata::new("mistral-small-latest", "", vec![]);
        assert_eq!(metadata.name, "Mistral Small Latest");

        let metadata = ModelMetadata::new("sonar_pro", "", vec![]);
        assert_eq!(metadata.name, "Sonar Pro");
    }

    #[test]
    fn test_explicit_name_kept() {
        let metadata = ModelMetadata::new("sonar", "Sonar by Perplexity", vec![]);
        assert_eq!(metadata.name, "Sonar by Perplexity");
    }

    #[test]
    fn test_capabilities_deduplicated() {
        let metadata = ModelMetadata::new(
            "m",
            "",
            vec![
                Capability::TextGeneration,
                Capability::TextGeneration,
                Capability::ChatHistory,
            ],
        );
        assert_eq!(metadata.capabilities.len(), 2);
        assert!(metadata.supports(&[Capability::TextGeneration, Capability::ChatHistory]));
        assert!(!metadata.supports(&[Capability::WebSearch]));
    }
}
