//! Google Gemini provider implementation.
//!
//! Gemini does not speak the OpenAI-compatible dialect: requests carry
//! `contents`/`generationConfig`/`systemInstruction` and responses carry
//! `candidates`. The common part wire shape matches Gemini's, so content
//! converts without translation.

use crate::auth::ApiKey;
use crate::client::{extract_key, ApiClient};
use crate::error::{ProviderError, Result};
use crate::openai_compatible::{apply_generation_config, ConfigRule};
use crate::service::{
    required_model_capabilities, resolve_model_metadata, CandidatesStream, ContentInput,
    GenerativeModel, ModelParams, Service,
};
use aiservices_core::capability::select_by_capabilities;
use aiservices_core::{
    Candidate, Candidates, Capability, Content, ContentRole, FinishReason, ModelMetadata, Part,
    ServiceKind, ServiceMetadata, Tool,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default Google AI API base URL.
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Preference rules, most significant first.
const PREFERENCE_RULES: &[fn(&str) -> bool] = &[
    |slug| slug.starts_with("gemini-"),
    |slug| slug.contains("-flash"),
    |slug| slug.ends_with("-latest"),
];

const TEXT_MODEL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::MultimodalInput,
    Capability::FunctionCalling,
    Capability::WebSearch,
];

const IMAGE_MODEL_CAPS: &[Capability] =
    &[Capability::ImageGeneration, Capability::MultimodalOutput];

/// Gemini generation-config transformer table; the wire names are the
/// camelCase fields of `generationConfig`.
const CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        canonical: "maxOutputTokens",
        wire: "maxOutputTokens",
        map: |c| c.max_output_tokens.map(Value::from),
    },
    ConfigRule {
        canonical: "temperature",
        wire: "temperature",
        map: |c| c.temperature.map(Value::from),
    },
    ConfigRule {
        canonical: "topP",
        wire: "topP",
        map: |c| c.top_p.map(Value::from),
    },
    ConfigRule {
        canonical: "topK",
        wire: "topK",
        map: |c| c.top_k.map(Value::from),
    },
    ConfigRule {
        canonical: "stopSequences",
        wire: "stopSequences",
        map: |c| c.stop_sequences.clone().map(Value::from),
    },
    ConfigRule {
        canonical: "candidateCount",
        wire: "candidateCount",
        map: |c| c.candidate_count.map(Value::from),
    },
];

enum ModelFlavor {
    Text,
    Image,
}

/// Google Gemini provider service.
pub struct GoogleService {
    metadata: ServiceMetadata,
    client: ApiClient,
}

impl GoogleService {
    /// Service slug.
    pub const SLUG: &'static str = "google";

    /// Create a service with an API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let auth = ApiKey::new(api_key)?.with_header("x-goog-api-key");
        Ok(Self {
            metadata: ServiceMetadata::new(
                Self::SLUG,
                "Google Gemini",
                ServiceKind::Cloud,
                "https://aistudio.google.com/app/apikey",
            ),
            client: ApiClient::new(DEFAULT_API_BASE, Some("v1beta"), auth)?,
        })
    }

    /// Create a service from the `GOOGLE_API_KEY` or `GEMINI_API_KEY`
    /// environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| {
                ProviderError::config(
                    "GOOGLE_API_KEY or GEMINI_API_KEY environment variable not set",
                )
            })?;
        Self::new(api_key)
    }

    /// Point the service at a different base URL (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    fn capabilities_from_record(record: &Value) -> Vec<Capability> {
        let methods: Vec<&str> = record
            .get("supportedGenerationMethods")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut capabilities = Vec::new();
        if methods.contains(&"generateContent") {
            capabilities.extend_from_slice(TEXT_MODEL_CAPS);
        }
        if methods.contains(&"predict") {
            capabilities.extend_from_slice(IMAGE_MODEL_CAPS);
        }
        capabilities
    }
}

#[async_trait]
impl Service for GoogleService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        let response = self
            .client
            .get_json("models", &Default::default())
            .await?;

        let records = extract_key(&response, "models")?
            .as_array()
            .ok_or_else(|| ProviderError::missing_key("models"))?;
        if records.is_empty() {
            return Err(ProviderError::missing_key("models"));
        }

        let mut models = BTreeMap::new();
        for record in records {
            let Some(name) = record.get("name").and_then(Value::as_str) else {
                warn!("Skipping model record without a name");
                continue;
            };
            let slug = name.trim_start_matches("models/");
            let display_name = record
                .get("displayName")
                .and_then(Value::as_str)
                .unwrap_or("");
            let capabilities = Self::capabilities_from_record(record);
            if capabilities.is_empty() {
                // Embedding and token-counting models are not generative.
                continue;
            }
            models.insert(
                slug.to_string(),
                ModelMetadata::new(slug, display_name, capabilities),
            );
        }

        if models.is_empty() {
            return Err(ProviderError::missing_key("models"));
        }
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
            ModelFlavor::Text => Box::new(GoogleModel {
                client: self.client.clone(),
                metadata,
                params,
            }),
            ModelFlavor::Image => Box::new(GoogleImageModel {
                client: self.client.clone(),
                metadata,
                params,
            }),
        })
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

/// Parse a Gemini generate-content response (or stream chunk) into
/// candidates. A missing `candidates` key is a hard failure.
fn candidates_from_google_response(response: &Value) -> Result<Candidates> {
    let records = extract_key(response, "candidates")?
        .as_array()
        .ok_or_else(|| ProviderError::missing_key("candidates"))?;

    let mut candidates = Candidates::new();
    for record in records {
        let content = extract_key(record, "content")?;
        let role = content
            .get("role")
            .and_then(Value::as_str)
            .map(ContentRole::from_str_value)
            .transpose()?
            .unwrap_or(ContentRole::Model);

        let mut parts = Vec::new();
        if let Some(raw_parts) = content.get("parts").and_then(Value::as_array) {
            for raw in raw_parts {
                let part = match Part::from_value(raw)? {
                    // Gemini omits call ids; synthesize one so function
                    // responses can be correlated.
                    Part::FunctionCall { id, name, args } if id.is_empty() => {
                        Part::function_call(uuid::Uuid::new_v4().to_string(), name, args)?
                    }
                    part => part,
                };
                parts.push(part);
            }
        }

        let mut candidate = Candidate::new(Content::new(role, parts));
        if let Some(reason) = record.get("finishReason").and_then(Value::as_str) {
            candidate = candidate.with_finish_reason(match reason {
                "STOP" => FinishReason::Stop,
                "MAX_TOKENS" => FinishReason::MaxTokens,
                "SAFETY" => FinishReason::Safety,
                other => FinishReason::Other(other.to_string()),
            });
        }
        if let Some(index) = record.get("index").and_then(Value::as_u64) {
            candidate = candidate.with_index(index as u32);
        }
        candidates.push(candidate);
    }
    Ok(candidates)
}

/// A Gemini text model.
pub struct GoogleModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

impl GoogleModel {
    fn build_request_body(&self, input: ContentInput) -> Result<Value> {
        let history = input.into_history();

        // System turns ride in `systemInstruction`, not `contents`.
        let mut system_texts: Vec<String> = Vec::new();
        if let Some(instruction) = &self.params.system_instruction {
            system_texts.push(instruction.text());
        }

        let mut contents = Vec::new();
        for turn in &history {
            if turn.role == ContentRole::System {
                system_texts.push(turn.text());
            } else {
                contents.push(turn.to_value());
            }
        }

        let mut body = Map::new();
        body.insert("contents".to_string(), Value::Array(contents));

        if !system_texts.is_empty() {
            body.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": system_texts.join("\n") }] }),
            );
        }

        let mut generation_config = Map::new();
        apply_generation_config(
            &mut generation_config,
            &self.params.generation_config,
            CONFIG_RULES,
        );
        if !generation_config.is_empty() {
            body.insert(
                "generationConfig".to_string(),
                Value::Object(generation_config),
            );
        }

        self.prepare_tools(&mut body)?;
        Ok(Value::Object(body))
    }

    fn prepare_tools(&self, body: &mut Map<String, Value>) -> Result<()> {
        let mut tools = Vec::new();
        for tool in &self.params.tools {
            match tool {
                Tool::FunctionDeclarations(declarations) => {
                    tools.push(json!({
                        "functionDeclarations": declarations
                            .iter()
                            .map(|d| json!({
                                "name": d.name,
                                "description": d.description,
                                "parameters": d.parameters,
                            }))
                            .collect::<Vec<_>>(),
                    }));
                }
                Tool::WebSearch {
                    allowed_domains,
                    disallowed_domains,
                } => {
                    if !allowed_domains.is_empty() || !disallowed_domains.is_empty() {
                        return Err(ProviderError::invalid_request(
                            "gemini grounding does not support domain restrictions",
                        ));
                    }
                    tools.push(json!({ "google_search": {} }));
                }
            }
        }
        if !tools.is_empty() {
            body.insert("tools".to_string(), Value::Array(tools));
        }
        Ok(())
    }
}

#[async_trait]
impl GenerativeModel for GoogleModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        let body = self.build_request_body(input)?;
        debug!(model = %self.metadata.slug, "Sending request to Google");

        let path = format!("models/{}:generateContent", self.metadata.slug);
        let response = self
            .client
            .post_json(&path, &body, &self.params.request_options)
            .await?;
        candidates_from_google_response(&response)
    }

    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        let body = self.build_request_body(input)?;
        debug!(model = %self.metadata.slug, "Sending streaming request to Google");

        let path = format!("models/{}:streamGenerateContent?alt=sse", self.metadata.slug);
        let chunks = self
            .client
            .post_sse(&path, &body, &self.params.request_options)
            .await?;
        let stream =
            chunks.map(|chunk| chunk.and_then(|value| candidates_from_google_response(&value)));
        Ok(Box::pin(stream))
    }
}

/// An Imagen image model.
pub struct GoogleImageModel {
    client: ApiClient,
    metadata: ModelMetadata,
    params: ModelParams,
}

#[async_trait]
impl GenerativeModel for GoogleImageModel {
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

        let mut parameters = Map::new();
        if let Some(count) = self.params.generation_config.candidate_count {
            parameters.insert("sampleCount".to_string(), Value::from(count));
        }

        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": Value::Object(parameters),
        });

        debug!(model = %self.metadata.slug, "Sending image request to Google");
        let path = format!("models/{}:predict", self.metadata.slug);
        let response = self
            .client
            .post_json(&path, &body, &self.params.request_options)
            .await?;

        let predictions = extract_key(&response, "predictions")?
            .as_array()
            .ok_or_else(|| ProviderError::missing_key("predictions"))?;

        let mut candidates = Candidates::new();
        for (index, prediction) in predictions.iter().enumerate() {
            let data = extract_key(prediction, "bytesBase64Encoded")?
                .as_str()
                .ok_or_else(|| ProviderError::missing_key("bytesBase64Encoded"))?;
            let mime_type = prediction
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            candidates.push(
                Candidate::new(Content::new(
                    ContentRole::Model,
                    vec![Part::inline_data(mime_type, data)],
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
    use aiservices_core::GenerationConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> GoogleService {
        GoogleService::new("test-key").unwrap()
    }

    fn text_model(params: ModelParams) -> GoogleModel {
        GoogleModel {
            client: ApiClient::new(DEFAULT_API_BASE, Some("v1beta"), ApiKey::new("k").unwrap())
                .unwrap(),
            metadata: ModelMetadata::new("gemini-2.0-flash", "", TEXT_MODEL_CAPS.to_vec()),
            params,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let model = text_model(
            ModelParams::new()
                .with_system_instruction(Content::system("be terse"))
                .with_generation_config(
                    GenerationConfig::new()
                        .with_max_output_tokens(50)
                        .with_top_k(3),
                ),
        );

        let body = model.build_request_body(ContentInput::from("hello")).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "be terse"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(50));
        assert_eq!(body["generationConfig"]["topK"], json!(3));
    }

    #[test]
    fn test_system_turns_fold_into_instruction() {
        let model = text_model(ModelParams::new());
        let history = vec![Content::system("stay factual"), Content::user("hi")];

        let body = model
            .build_request_body(ContentInput::from(history))
            .unwrap();
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "stay factual"
        );
    }

    #[test]
    fn test_tools_prepared_in_gemini_shape() {
        let declaration = aiservices_core::FunctionDeclaration::new(
            "get_weather",
            "Weather lookup",
            json!({ "type": "object", "properties": { "city": { "type": "string" } } }),
        )
        .unwrap();
        let model = text_model(
            ModelParams::new()
                .with_tool(Tool::function_declarations(vec![declaration]))
                .with_tool(Tool::web_search()),
        );

        let body = model.build_request_body(ContentInput::from("hi")).unwrap();
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(
            tools[0]["functionDeclarations"][0]["name"],
            "get_weather"
        );
        assert!(tools[1].get("google_search").is_some());
    }

    #[test]
    fn test_web_search_domains_rejected() {
        let model = text_model(ModelParams::new().with_tool(Tool::web_search_with_domains(
            vec!["example.com".to_string()],
            vec![],
        )));

        let err = model.build_request_body(ContentInput::from("hi")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_response_synthesizes_call_ids() {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Checking." },
                        { "functionCall": { "name": "get_weather", "args": { "city": "Berlin" } } },
                    ],
                },
                "finishReason": "STOP",
                "index": 0,
            }],
        });

        let candidates = candidates_from_google_response(&response).unwrap();
        let candidate = candidates.first().unwrap();
        assert_eq!(candidate.finish_reason, Some(FinishReason::Stop));
        match &candidate.content.parts[1] {
            Part::FunctionCall { id, name, .. } => {
                assert_eq!(name, "get_weather");
                assert!(!id.is_empty());
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_candidates_is_hard_failure() {
        let err = candidates_from_google_response(&json!({})).unwrap_err();
        assert!(matches!(err, ProviderError::MissingResponseKey(k) if k == "candidates"));
    }

    #[test]
    fn test_capabilities_from_methods() {
        let chat = json!({
            "name": "models/gemini-2.0-flash",
            "supportedGenerationMethods": ["generateContent", "countTokens"],
        });
        let capabilities = GoogleService::capabilities_from_record(&chat);
        assert!(capabilities.contains(&Capability::TextGeneration));

        let imagen = json!({
            "name": "models/imagen-3.0-generate-002",
            "supportedGenerationMethods": ["predict"],
        });
        let capabilities = GoogleService::capabilities_from_record(&imagen);
        assert!(capabilities.contains(&Capability::ImageGeneration));
    }

    #[test]
    fn test_sort_prefers_gemini_flash() {
        let mut slugs: Vec<String> = [
            "imagen-3.0-generate-002",
            "gemini-2.0-pro",
            "gemini-2.0-flash",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        service().sort_models_by_preference(&mut slugs);
        assert_eq!(
            slugs,
            vec!["gemini-2.0-flash", "gemini-2.0-pro", "imagen-3.0-generate-002"]
        );
    }

    #[tokio::test]
    async fn test_list_models_strips_prefix_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {
                        "name": "models/gemini-2.0-flash",
                        "displayName": "Gemini 2.0 Flash",
                        "supportedGenerationMethods": ["generateContent"],
                    },
                    {
                        "name": "models/text-embedding-004",
                        "supportedGenerationMethods": ["embedContent"],
                    },
                ],
            })))
            .mount(&server)
            .await;

        let service = service().with_base_url(server.uri());
        let models = service.list_models().await.unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models["gemini-2.0-flash"].name, "Gemini 2.0 Flash");
    }
}
