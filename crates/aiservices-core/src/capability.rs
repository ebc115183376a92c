//! The closed capability vocabulary and capability negotiation.
//!
//! A [`Capability`] names one facet of what a model or service can do. The
//! set of valid capabilities is fixed at compile time ([`Capability::ALL`]);
//! providers map their own feature flags onto it when listing models.
//!
//! Negotiation is deliberately strict: when a requirement cannot be met the
//! helpers here fail with a typed error instead of silently substituting a
//! different model.

use crate::error::{Error, Result};
use crate::types::ModelMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One facet of what an AI model or service can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Generate text from a prompt.
    TextGeneration,
    /// Accept multi-turn conversation history.
    ChatHistory,
    /// Accept non-text input (images, files).
    MultimodalInput,
    /// Produce non-text output.
    MultimodalOutput,
    /// Generate images.
    ImageGeneration,
    /// Call declared functions (tool use).
    FunctionCalling,
    /// Ground responses with web search.
    WebSearch,
}

impl Capability {
    /// Every valid capability, in canonical order.
    pub const ALL: [Capability; 7] = [
        Capability::TextGeneration,
        Capability::ChatHistory,
        Capability::MultimodalInput,
        Capability::MultimodalOutput,
        Capability::ImageGeneration,
        Capability::FunctionCalling,
        Capability::WebSearch,
    ];

    /// Wire identifier for this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TextGeneration => "text_generation",
            Capability::ChatHistory => "chat_history",
            Capability::MultimodalInput => "multimodal_input",
            Capability::MultimodalOutput => "multimodal_output",
            Capability::ImageGeneration => "image_generation",
            Capability::FunctionCalling => "function_calling",
            Capability::WebSearch => "web_search",
        }
    }

    /// Parse a wire identifier.
    pub fn from_str_value(value: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == value)
            .ok_or_else(|| Error::validation(format!("unknown capability `{value}`")))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `declared` covers every capability in `required`.
pub fn supports_all(declared: &[Capability], required: &[Capability]) -> bool {
    required.iter().all(|c| declared.contains(c))
}

/// Filter a model-metadata map down to the slugs whose capability set covers
/// `required`. Order follows the map's slug order; an empty result is the
/// caller's signal to report "no available model".
pub fn model_slugs_for_capabilities(
    models: &BTreeMap<String, ModelMetadata>,
    required: &[Capability],
) -> Vec<String> {
    models
        .values()
        .filter(|m| supports_all(&m.capabilities, required))
        .map(|m| m.slug.clone())
        .collect()
}

/// Pick the first variant whose declared capability set covers `required`.
///
/// `variants` is consulted in priority order; no variant matching is a hard
/// failure, never a silent substitution.
pub fn select_by_capabilities<'a, T>(
    variants: &'a [(&'static [Capability], T)],
    required: &[Capability],
) -> Result<&'a T> {
    variants
        .iter()
        .find(|(declared, _)| supports_all(declared, required))
        .map(|(_, value)| value)
        .ok_or_else(|| {
            let wanted = required
                .iter()
                .map(Capability::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            Error::unsatisfiable(wanted)
        })
}
