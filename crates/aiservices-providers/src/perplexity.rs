//! Perplexity provider implementation.
//!
//! Perplexity exposes no models endpoint; the model list is a table derived
//! from provider documentation. Every Sonar model has web search built in.

use crate::auth::ApiKey;
use crate::client::ApiClient;
use crate::error::{ProviderError, Result};
use crate::openai_compatible::{
    apply_generation_config, candidates_from_response, candidates_from_stream_chunk,
    messages_from_contents, ConfigRule,
};
use crate::service::{
    required_model_capabilities, resolve_model_metadata, CandidatesStream, ContentInput,
    GenerativeModel, ModelParams, Service,
};
use aiservices_core::capability::select_by_capabilities;
use aiservices_core::{
    Candidates, Capability, GenerationConfig, ModelMetadata, ServiceKind, ServiceMetadata, Tool,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Default Perplexity API base URL.
const DEFAULT_API_BASE: &str = "https://api.perplexity.ai";

const SEARCH_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::WebSearch,
];

const SEARCH_MULTIMODAL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::WebSearch,
    Capability::MultimodalInput,
];

/// Documentation-derived model table.
const KNOWN_MODELS: &[(&str, &[Capability])] = &[
    ("sonar", SEARCH_MULTIMODAL_CAPS),
    ("sonar-pro", SEARCH_MULTIMODAL_CAPS),
    ("sonar-reasoning", SEARCH_CAPS),
    ("sonar-reasoning-pro", SEARCH_CAPS),
    ("sonar-deep-research", SEARCH_CAPS),
];

/// Slugs privileged by the preference order, most preferred first;
/// everything else sorts alphabetically after them.
const PREFERRED_SLUGS: &[&str] = &["sonar", "sonar-pro"];

/// Capabilities covered by the Perplexity chat model implementation.
const TEXT_MODEL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::WebSearch,
    Capability::MultimodalInput,
];

/// Perplexity generation-config transformer table.
///
/// The output budget is renamed to `max_tokens`, `top_k` is supported
/// despite the otherwise OpenAI-compatible surface, and unsupported fields
/// (`stop`, `n`) have no row at all.
const CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        canonical: "maxOutputTokens",
        wire: "max_tokens",
        map: |c| c.max_output_tokens.map(Value::from),
    },
    ConfigRule {
        canonical: "temperature",
        wire: "temperature",
        map: |c| c.temperature.map(Value::from),
    },
    ConfigRule {
        canonical: "topP",
        wire: "top_p",
        map: |c| c.top_p.map(Value::from),
    },
    ConfigRule {
        canonical: "topK",
        wire: "top_k",
        map: |c| c.top_k.map(Value::from),
    },
    ConfigRule {
        canonical: "presencePenalty",
        wire: "presence_penalty",
        map: |c| c.presence_penalty.map(Value::from),
    },
    ConfigRule {
        canonical: "frequencyPenalty",
        wire: "frequency_penalty",
        map: |c| c.frequency_penalty.map(Value::from),
    },
];

/// Perplexity provider service.
pub struct PerplexityService {
    metadata: ServiceMetadata,
    client: ApiClient,
}

impl PerplexityService {
    /// Service slug.
    pub const SLUG: &'static str = "perplexity";

    /// Create a service with an API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let auth = ApiKey::new(api_key)?;
        Ok(Self {
            metadata: ServiceMetadata::new(
                Self::SLUG,
                "Perplexity",
                ServiceKind::Cloud,
                "https://www.perplexity.ai/settings/api",
            ),
            client: ApiClient::new(DEFAULT_API_BASE, None, auth)?,
        })
    }

    /// Create a service from the `PERPLEXITY_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PERPLEXITY_API_KEY").map_err(|_| {
            ProviderError::config("PERPLEXITY_API_KEY environment variable not set")
        })?;
        Self::new(api_key)
    }

    /// Point the service at a different base URL (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl Service for PerplexityService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        Ok(KNOWN_MODELS
            .iter()
            .map(|(slug, capabilities)| {
                (
                    slug.to_string(),
                    ModelMetadata::new(*slug, "", capabilities.to_vec()),
                )
            })
            .collect())
    }

    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>> {
        let metadata = resolve_model_metadata(self, &params).await?;
        let required = required_model_capabilities(&metadata, &params);

        let variants: [(&'static [Capability], ()); 1] = [(TEXT_MODEL_CAPS, ())];
        select_by_capabilities(&variants, &required)
            .map_err(|e| ProviderError::config(e.to_string()))?;

        Ok(Box::new(PerplexityModel {
            client: self.client.clone(),
            metadata,
            params,
        }))
    }

    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        slugs.sort_by(|a, b| {
            let rank = |slug: &str| {
                PREFERRED_SLUGS
                    .iter()
                    .position(|preferred| *preferred == slug)
                    .unwrap_or(PREFERRED_SLUGS.len())
            };
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });
    }

    /// Probe credentials with the cheapest possible generation call: one
    /// output token against the default model. Only a provider-side
    /// generation failure reads as "not connected".
    async fn is_connected(&self) -> Result<bool> {
        let params = ModelParams::new()
            .with_model("sonar")
            .with_generation_config(GenerationConfig::new().with_max_output_tokens(1));
        let model = self.get_model(params).await?;

        match model.generate_text(ContentInput::from("a")).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_provider_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn api_client(&self) -> Option<&ApiClient> {
        Some(&self.client)
    }
}

/// A Perplexity Sonar model.
pub struct PerplexityModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

impl PerplexityModel {
    fn build_request_body(&self, input: ContentInput, stream: bool) -> Result<Value> {
        let history = input.into_history();

        let mut body = Map::new();
        body.insert(
            "model".to_string(),
            Value::String(self.metadata.slug.clone()),
        );
        body.insert(
            "messages".to_string(),
            Value::Array(messages_from_contents(
                self.params.system_instruction.as_ref(),
                &history,
            )?),
        );
        apply_generation_config(&mut body, &self.params.generation_config, CONFIG_RULES);
        self.prepare_tools(&mut body)?;
        if stream {
            body.insert("stream".to_string(), Value::Bool(true));
        }
        Ok(Value::Object(body))
    }

    fn prepare_tools(&self, body: &mut Map<String, Value>) -> Result<()> {
        for tool in &self.params.tools {
            match tool {
                Tool::WebSearch {
                    allowed_domains,
                    disallowed_domains,
                } => {
                    // Search is always on; domain constraints become the
                    // `search_domain_filter` param, with disallowed domains
                    // prefixed `-`.
                    let mut filter: Vec<Value> = allowed_domains
                        .iter()
                        .map(|domain| Value::String(domain.clone()))
                        .collect();
                    filter.extend(
                        disallowed_domains
                            .iter()
                            .map(|domain| Value::String(format!("-{domain}"))),
                    );
                    if !filter.is_empty() {
                        body.insert("search_domain_filter".to_string(), Value::Array(filter));
                    }
                }
                Tool::FunctionDeclarations(_) => {
                    return Err(ProviderError::invalid_request(
                        "perplexity models do not support function calling",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GenerativeModel for PerplexityModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        let body = self.build_request_body(input, false)?;
        debug!(model = %self.metadata.slug, "Sending request to Perplexity");

        let response = self
            .client
            .post_json("chat/completions", &body, &self.params.request_options)
            .await?;
        candidates_from_response(&response)
    }

    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        let body = self.build_request_body(input, true)?;
        debug!(model = %self.metadata.slug, "Sending streaming request to Perplexity");

        let chunks = self
            .client
            .post_sse("chat/completions", &body, &self.params.request_options)
            .await?;
        let stream =
            chunks.map(|chunk| chunk.and_then(|value| candidates_from_stream_chunk(&value)));
        Ok(Box::pin(stream))
    }
}
