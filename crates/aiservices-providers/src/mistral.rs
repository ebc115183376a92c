//! Mistral provider implementation.

use crate::auth::ApiKey;
use crate::client::{extract_key, ApiClient};
use crate::error::{ProviderError, Result};
use crate::openai_compatible::{
    apply_generation_config, candidates_from_response, candidates_from_stream_chunk,
    function_tools_value, ConfigRule,
};
use crate::service::{
    required_model_capabilities, resolve_model_metadata, CandidatesStream, ContentInput,
    GenerativeModel, ModelParams, Service,
};
use aiservices_core::capability::select_by_capabilities;
use aiservices_core::{Candidates, Capability, ModelMetadata, ServiceKind, ServiceMetadata, Tool};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default Mistral API base URL.
const DEFAULT_API_BASE: &str = "https://api.mistral.ai";

/// Preference rules, most significant first. Pure predicates over the slug
/// so provider renames stay a table edit.
const PREFERENCE_RULES: &[fn(&str) -> bool] = &[
    |slug| slug.starts_with("mistral-"),
    |slug| slug.ends_with("-latest"),
    |slug| slug.starts_with("mistral-small"),
];

/// Capabilities covered by the Mistral chat model implementation.
const TEXT_MODEL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::MultimodalInput,
    Capability::FunctionCalling,
];

/// Mistral generation-config transformer table. Mistral keeps the legacy
/// `max_tokens` name for the output budget.
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
        canonical: "stopSequences",
        wire: "stop",
        map: |c| c.stop_sequences.clone().map(Value::from),
    },
    ConfigRule {
        canonical: "candidateCount",
        wire: "n",
        map: |c| c.candidate_count.map(Value::from),
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

/// Mistral provider service.
pub struct MistralService {
    metadata: ServiceMetadata,
    client: ApiClient,
}

impl MistralService {
    /// Service slug.
    pub const SLUG: &'static str = "mistral";

    /// Create a service with an API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let auth = ApiKey::new(api_key)?;
        Ok(Self {
            metadata: ServiceMetadata::new(
                Self::SLUG,
                "Mistral",
                ServiceKind::Cloud,
                "https://console.mistral.ai/api-keys/",
            ),
            client: ApiClient::new(DEFAULT_API_BASE, Some("v1"), auth)?,
        })
    }

    /// Create a service from the `MISTRAL_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .map_err(|_| ProviderError::config("MISTRAL_API_KEY environment variable not set"))?;
        Self::new(api_key)
    }

    /// Point the service at a different base URL (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    /// Map the per-model capability flags Mistral reports onto the common
    /// vocabulary.
    fn capabilities_from_record(record: &Value) -> Vec<Capability> {
        let flags = record.get("capabilities").and_then(Value::as_object);
        let flag = |name: &str| {
            flags
                .and_then(|f| f.get(name))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        let mut capabilities = Vec::new();
        // Records without a flags object predate the field; they are all
        // chat models.
        if flags.is_none() || flag("completion_chat") {
            capabilities.push(Capability::TextGeneration);
            capabilities.push(Capability::ChatHistory);
        }
        if flag("function_calling") {
            capabilities.push(Capability::FunctionCalling);
        }
        if flag("vision") {
            capabilities.push(Capability::MultimodalInput);
        }
        capabilities
    }
}

#[async_trait]
impl Service for MistralService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        let response = self
            .client
            .get_json("models", &Default::default())
            .await?;

        let records = extract_key(&response, "data")?
            .as_array()
            .ok_or_else(|| ProviderError::missing_key("data"))?;
        if records.is_empty() {
            return Err(ProviderError::missing_key("data"));
        }

        let mut models = BTreeMap::new();
        for record in records {
            let Some(slug) = record.get("id").and_then(Value::as_str) else {
                warn!("Skipping model record without an id");
                continue;
            };
            let capabilities = Self::capabilities_from_record(record);
            models.insert(
                slug.to_string(),
                ModelMetadata::new(slug, "", capabilities),
            );
        }
        Ok(models)
    }

    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>> {
        let metadata = resolve_model_metadata(self, &params).await?;
        let required = required_model_capabilities(&metadata, &params);

        let variants: [(&'static [Capability], ()); 1] = [(TEXT_MODEL_CAPS, ())];
        select_by_capabilities(&variants, &required)
            .map_err(|e| ProviderError::config(e.to_string()))?;

        Ok(Box::new(MistralModel {
            client: self.client.clone(),
            metadata,
            params,
        }))
    }

    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        slugs.sort_by(|a, b| {
            let rank = |slug: &str| -> Vec<bool> {
                PREFERENCE_RULES.iter().map(|rule| !rule(slug)).collect()
            };
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });
    }

    fn api_client(&self) -> Option<&ApiClient> {
        Some(&self.client)
    }
}

/// A Mistral chat model.
pub struct MistralModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

impl MistralModel {
    fn build_request_body(&self, input: ContentInput, stream: bool) -> Result<Value> {
        let history = input.into_history();

        let mut body = Map::new();
        body.insert(
            "model".to_string(),
            Value::String(self.metadata.slug.clone()),
        );
        body.insert(
            "messages".to_string(),
            Value::Array(crate::openai_compatible::messages_from_contents(
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
                Tool::FunctionDeclarations(declarations) => {
                    body.insert("tools".to_string(), function_tools_value(declarations));
                    body.insert("tool_choice".to_string(), Value::String("auto".to_string()));
                }
                Tool::WebSearch { .. } => {
                    return Err(ProviderError::invalid_request(
                        "mistral models do not support the web search tool",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GenerativeModel for MistralModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        let body = self.build_request_body(input, false)?;
        debug!(model = %self.metadata.slug, "Sending request to Mistral");

        let response = self
            .client
            .post_json("chat/completions", &body, &self.params.request_options)
            .await?;
        candidates_from_response(&response)
    }

    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        let body = self.build_request_body(input, true)?;
        debug!(model = %self.metadata.slug, "Sending streaming request to Mistral");

        let chunks = self
            .client
            .post_sse("chat/completions", &body, &self.params.request_options)
            .await?;
        let stream =
            chunks.map(|chunk| chunk.and_then(|value| candidates_from_stream_chunk(&value)));
        Ok(Box::pin(stream))
    }
}
