//! xAI (Grok) provider implementation.

use crate::auth::ApiKey;
use crate::client::{extract_key, ApiClient};
use crate::error::{ProviderError, Result};
use crate::openai_compatible::{
    apply_generation_config, candidates_from_response, candidates_from_stream_chunk,
    function_tools_value, messages_from_contents, ConfigRule,
};
use crate::service::{
    required_model_capabilities, resolve_model_metadata, CandidatesStream, ContentInput,
    GenerativeModel, ModelParams, Service,
};
use aiservices_core::capability::select_by_capabilities;
use aiservices_core::{
    Candidate, Candidates, Capability, Content, ContentRole, ModelMetadata, Part, ServiceKind,
    ServiceMetadata, Tool,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default xAI API base URL.
const DEFAULT_API_BASE: &str = "https://api.x.ai";

/// Model families in preference order, newest first. Renamed families are a
/// table edit here, not a control-flow change.
const FAMILY_ORDER: &[&str] = &["grok-4", "grok-3", "grok-2"];

/// The dedicated image-generation model; not reported by the
/// language-models endpoint.
const IMAGE_MODEL_SLUG: &str = "grok-2-image";

const TEXT_MODEL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::MultimodalInput,
    Capability::FunctionCalling,
    Capability::WebSearch,
];

const IMAGE_MODEL_CAPS: &[Capability] =
    &[Capability::ImageGeneration, Capability::MultimodalOutput];

/// xAI generation-config transformer table: the plain OpenAI-compatible
/// rows plus `top_k`, which xAI supports atypically for this API shape.
const CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        canonical: "maxOutputTokens",
        wire: "max_completion_tokens",
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

enum ModelFlavor {
    Text,
    Image,
}

/// xAI provider service.
pub struct XaiService {
    metadata: ServiceMetadata,
    client: ApiClient,
}

impl XaiService {
    /// Service slug.
    pub const SLUG: &'static str = "xai";

    /// Create a service with an API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let auth = ApiKey::new(api_key)?;
        Ok(Self {
            metadata: ServiceMetadata::new(
                Self::SLUG,
                "xAI",
                ServiceKind::Cloud,
                "https://console.x.ai/",
            ),
            client: ApiClient::new(DEFAULT_API_BASE, Some("v1"), auth)?,
        })
    }

    /// Create a service from the `XAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("XAI_API_KEY")
            .map_err(|_| ProviderError::config("XAI_API_KEY environment variable not set"))?;
        Self::new(api_key)
    }

    /// Point the service at a different base URL (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    /// Derive common capabilities from the modalities a language-model
    /// record reports. Every Grok chat model supports tool use and live
    /// search.
    fn capabilities_from_record(record: &Value) -> Vec<Capability> {
        let modalities = |key: &str| -> Vec<&str> {
            record
                .get(key)
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default()
        };

        let input = modalities("input_modalities");
        let output = modalities("output_modalities");

        let mut capabilities = Vec::new();
        if output.contains(&"text") {
            capabilities.push(Capability::TextGeneration);
            capabilities.push(Capability::ChatHistory);
            capabilities.push(Capability::FunctionCalling);
            capabilities.push(Capability::WebSearch);
        }
        if input.contains(&"image") {
            capabilities.push(Capability::MultimodalInput);
        }
        if output.contains(&"image") {
            capabilities.push(Capability::ImageGeneration);
            capabilities.push(Capability::MultimodalOutput);
        }
        capabilities
    }
}

#[async_trait]
impl Service for XaiService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        let response = self
            .client
            .get_json("language-models", &Default::default())
            .await?;

        let records = extract_key(&response, "models")?
            .as_array()
            .ok_or_else(|| ProviderError::missing_key("models"))?;
        if records.is_empty() {
            return Err(ProviderError::missing_key("models"));
        }

        let mut models = BTreeMap::new();
        for record in records {
            let Some(slug) = record.get("id").and_then(Value::as_str) else {
                warn!("Skipping model record without an id");
                continue;
            };
            models.insert(
                slug.to_string(),
                ModelMetadata::new(slug, "", Self::capabilities_from_record(record)),
            );
        }

        // The image model lives behind a separate endpoint and is absent
        // from the listing.
        models
            .entry(IMAGE_MODEL_SLUG.to_string())
            .or_insert_with(|| {
                ModelMetadata::new(IMAGE_MODEL_SLUG, "", IMAGE_MODEL_CAPS.to_vec())
            });

        Ok(models)
    }

    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>> {
        let metadata = resolve_model_metadata(self, &params).await?;
        let required = required_model_capabilities(&metadata, &params);

        let variants: [(&'static [Capability], ModelFlavor); 2] = [
            (TEXT_MODEL_CAPS, ModelFlavor::Text),
            (IMAGE_MODEL_CAPS, ModelFlavor::Image),
        ];
        let flavor = select_by_capabilities(&variants, &required)
            .map_err(|e| ProviderError::config(e.to_string()))?;

        Ok(match flavor {
            ModelFlavor::Text => Box::new(XaiModel {
                client: self.client.clone(),
                metadata,
                params,
            }),
            ModelFlavor::Image => Box::new(XaiImageModel {
                client: self.client.clone(),
                metadata,
                params,
            }),
        })
    }

    /// Group by family (newest family first), `mini` variants before full
    /// ones within a family, then alphabetical.
    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        slugs.sort_by(|a, b| {
            let rank = |slug: &str| {
                let family = FAMILY_ORDER
                    .iter()
                    .position(|family| slug.starts_with(family))
                    .unwrap_or(FAMILY_ORDER.len());
                let variant = if slug.contains("-mini") { 0 } else { 1 };
                (family, variant)
            };
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });
    }

    fn api_client(&self) -> Option<&ApiClient> {
        Some(&self.client)
    }
}

/// A Grok chat model.
pub struct XaiModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

impl XaiModel {
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
                Tool::FunctionDeclarations(declarations) => {
                    body.insert("tools".to_string(), function_tools_value(declarations));
                    body.insert("tool_choice".to_string(), Value::String("auto".to_string()));
                }
                Tool::WebSearch {
                    allowed_domains,
                    disallowed_domains,
                } => {
                    if !allowed_domains.is_empty() && !disallowed_domains.is_empty() {
                        return Err(ProviderError::invalid_request(
                            "xai live search cannot combine allowed and excluded websites",
                        ));
                    }

                    let mut source = Map::new();
                    source.insert("type".to_string(), Value::String("web".to_string()));
                    if !allowed_domains.is_empty() {
                        source.insert("allowed_websites".to_string(), json!(allowed_domains));
                    }
                    if !disallowed_domains.is_empty() {
                        source.insert("excluded_websites".to_string(), json!(disallowed_domains));
                    }

                    body.insert(
                        "search_parameters".to_string(),
                        json!({
                            "mode": "on",
                            "sources": [Value::Object(source)],
                        }),
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GenerativeModel for XaiModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        let body = self.build_request_body(input, false)?;
        debug!(model = %self.metadata.slug, "Sending request to xAI");

        let response = self
            .client
            .post_json("chat/completions", &body, &self.params.request_options)
            .await?;
        candidates_from_response(&response)
    }

    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        let body = self.build_request_body(input, true)?;
        debug!(model = %self.metadata.slug, "Sending streaming request to xAI");

        let chunks = self
            .client
            .post_sse("chat/completions", &body, &self.params.request_options)
            .await?;
        let stream =
            chunks.map(|chunk| chunk.and_then(|value| candidates_from_stream_chunk(&value)));
        Ok(Box::pin(stream))
    }
}

/// The Grok image-generation model.
pub struct XaiImageModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

#[async_trait]
impl GenerativeModel for XaiImageModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_image(&self, input: ContentInput) -> Result<Candidates> {
        let history = input.into_history();
        let prompt = history
            .iter()
            .map(Content::text)
            .collect::<Vec<_>>()
            .join("\n");

        let mut body = Map::new();
        body.insert(
            "model".to_string(),
            Value::String(self.metadata.slug.clone()),
        );
        body.insert("prompt".to_string(), Value::String(prompt));
        body.insert(
            "response_format".to_string(),
            Value::String("b64_json".to_string()),
        );
        if let Some(count) = self.params.generation_config.candidate_count {
            body.insert("n".to_string(), Value::from(count));
        }

        debug!(model = %self.metadata.slug, "Sending image request to xAI");
        let response = self
            .client
            .post_json(
                "images/generations",
                &Value::Object(body),
                &self.params.request_options,
            )
            .await?;

        let records = extract_key(&response, "data")?
            .as_array()
            .ok_or_else(|| ProviderError::missing_key("data"))?;

        let mut candidates = Candidates::new();
        for (index, record) in records.iter().enumerate() {
            let data = extract_key(record, "b64_json")?
                .as_str()
                .ok_or_else(|| ProviderError::missing_key("b64_json"))?;
            candidates.push(
                Candidate::new(Content::new(
                    ContentRole::Model,
                    vec![Part::inline_data("image/jpeg", data)],
                ))
                .with_index(index as u32),
            );
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> XaiService {
        XaiService::new("test-key").unwrap()
    }

    fn text_model(params: ModelParams) -> XaiModel {
        XaiModel {
            client: ApiClient::new(DEFAULT_API_BASE, Some("v1"), ApiKey::new("k").unwrap())
                .unwrap(),
            metadata: ModelMetadata::new("grok-3", "", TEXT_MODEL_CAPS.to_vec()),
            params,
        }
    }

    #[test]
    fn test_capabilities_from_modalities() {
        let record = json!({
            "id": "grok-2-vision",
            "input_modalities": ["text", "image"],
            "output_modalities": ["text"],
        });
        let capabilities = XaiService::capabilities_from_record(&record);
        assert!(capabilities.contains(&Capability::TextGeneration));
        assert!(capabilities.contains(&Capability::MultimodalInput));
        assert!(capabilities.contains(&Capability::WebSearch));
        assert!(!capabilities.contains(&Capability::ImageGeneration));
    }

    #[test]
    fn test_sort_groups_families_and_prefers_mini() {
        let mut slugs: Vec<String> = ["grok-2", "grok-3", "grok-3-mini", "grok-2-vision"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        service().sort_models_by_preference(&mut slugs);
        assert_eq!(slugs, vec!["grok-3-mini", "grok-3", "grok-2", "grok-2-vision"]);

        let sorted = slugs.clone();
        service().sort_models_by_preference(&mut slugs);
        assert_eq!(slugs, sorted);
    }

    #[test]
    fn test_web_search_parameters() {
        let model = text_model(ModelParams::new().with_tool(Tool::web_search_with_domains(
            vec![],
            vec!["spam.com".to_string()],
        )));

        let body = model.build_request_body(ContentInput::from("hi"), false).unwrap();
        assert_eq!(body["search_parameters"]["mode"], "on");
        assert_eq!(
            body["search_parameters"]["sources"][0]["excluded_websites"],
            json!(["spam.com"])
        );
    }

    #[test]
    fn test_web_search_rejects_mixed_domain_lists() {
        let model = text_model(ModelParams::new().with_tool(Tool::web_search_with_domains(
            vec!["example.com".to_string()],
            vec!["spam.com".to_string()],
        )));

        let err = model.build_request_body(ContentInput::from("hi"), false).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_config_includes_top_k() {
        let model = text_model(ModelParams::new().with_generation_config(
            aiservices_core::GenerationConfig::new()
                .with_max_output_tokens(32)
                .with_top_k(7),
        ));

        let body = model.build_request_body(ContentInput::from("hi"), false).unwrap();
        assert_eq!(body["max_completion_tokens"], json!(32));
        assert_eq!(body["top_k"], json!(7));
    }

    #[tokio::test]
    async fn test_list_models_missing_models_key_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/language-models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let service = service().with_base_url(server.uri());
        let err = service.list_models().await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingResponseKey(k) if k == "models"));
    }

    #[tokio::test]
    async fn test_list_models_appends_image_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/language-models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{
                    "id": "grok-3",
                    "input_modalities": ["text"],
                    "output_modalities": ["text"],
                }],
            })))
            .mount(&server)
            .await;

        let service = service().with_base_url(server.uri());
        let models = service.list_models().await.unwrap();
        assert!(models.contains_key("grok-3"));
        assert!(models[IMAGE_MODEL_SLUG]
            .capabilities
            .contains(&Capability::ImageGeneration));
    }

    #[tokio::test]
    async fn test_generate_image_parses_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": "aW1hZ2U=" }],
            })))
            .mount(&server)
            .await;

        let model = XaiImageModel {
            client: ApiClient::new(server.uri(), Some("v1"), ApiKey::new("k").unwrap()).unwrap(),
            metadata: ModelMetadata::new(IMAGE_MODEL_SLUG, "", IMAGE_MODEL_CAPS.to_vec()),
            params: ModelParams::new(),
        };

        let candidates = model
            .generate_image(ContentInput::from("a red balloon"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        match &candidates.first().unwrap().content.parts[0] {
            Part::InlineData { mime_type, data } => {
                assert_eq!(mime_type, "image/jpeg");
                assert_eq!(data, "aW1hZ2U=");
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }
}
