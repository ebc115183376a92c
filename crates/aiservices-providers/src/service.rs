//! The service and model contracts every provider implements.

use crate::client::{ApiClient, RequestOptions};
use crate::error::{ProviderError, Result};
use aiservices_core::capability::{model_slugs_for_capabilities, Capability};
use aiservices_core::{
    Candidates, Content, GenerationConfig, ModelMetadata, ServiceMetadata, Tool,
};
use async_trait::async_trait;
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;

/// Lazy, single-pass stream of incremental [`Candidates`] chunks.
pub type CandidatesStream = Pin<Box<dyn Stream<Item = Result<Candidates>> + Send>>;

/// Prompt input accepted by generation calls: a bare string, one content
/// payload, or an ordered chat history.
#[derive(Debug, Clone)]
pub enum ContentInput {
    Text(String),
    Content(Content),
    History(Vec<Content>),
}

impl ContentInput {
    /// Normalize to an ordered list of chat turns. A bare string becomes a
    /// single user turn.
    pub fn into_history(self) -> Vec<Content> {
        match self {
            ContentInput::Text(text) => vec![Content::user(text)],
            ContentInput::Content(content) => vec![content],
            ContentInput::History(history) => history,
        }
    }
}

impl From<&str> for ContentInput {
    fn from(text: &str) -> Self {
        ContentInput::Text(text.to_string())
    }
}

impl From<String> for ContentInput {
    fn from(text: String) -> Self {
        ContentInput::Text(text)
    }
}

impl From<Content> for ContentInput {
    fn from(content: Content) -> Self {
        ContentInput::Content(content)
    }
}

impl From<Vec<Content>> for ContentInput {
    fn from(history: Vec<Content>) -> Self {
        ContentInput::History(history)
    }
}

/// Parameters for resolving and configuring a model.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    /// Explicit model slug; when unset the service picks a preferred model
    /// satisfying `capabilities`.
    pub model: Option<String>,

    /// Capabilities the resolved model must cover.
    pub capabilities: Vec<Capability>,

    /// Generation tuning parameters.
    pub generation_config: GenerationConfig,

    /// System instructions prepended to every invocation.
    pub system_instruction: Option<Content>,

    /// Tools attached to every invocation.
    pub tools: Vec<Tool>,

    /// Caller feature tag, used for logging and history grouping by
    /// external collaborators.
    pub feature: Option<String>,

    /// Per-call HTTP options.
    pub request_options: RequestOptions,
}

impl ModelParams {
    /// Create empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name an explicit model.
    pub fn with_model(mut self, slug: impl Into<String>) -> Self {
        self.model = Some(slug.into());
        self
    }

    /// Require a capability.
    pub fn require(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Set the generation config.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    /// Set the system instruction.
    pub fn with_system_instruction(mut self, instruction: Content) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    /// Attach a tool.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set the caller feature tag.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Set per-call HTTP options.
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }
}

/// A provider integration: model discovery plus model instantiation.
#[async_trait]
pub trait Service: Send + Sync {
    /// Metadata describing this service.
    fn metadata(&self) -> &ServiceMetadata;

    /// List the models this service exposes, keyed by slug.
    ///
    /// Derived fresh from the provider API or a documentation table on each
    /// call; an empty or malformed provider response is a hard failure.
    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>>;

    /// Resolve model metadata for `params` and construct the matching
    /// model.
    async fn get_model(&self, params: ModelParams) -> Result<Box<dyn GenerativeModel>>;

    /// Order model slugs so the preferred default comes first.
    ///
    /// A pure function over the slug strings; each provider documents its
    /// own tie-break rules. The default keeps the incoming order.
    fn sort_models_by_preference(&self, _slugs: &mut [String]) {}

    /// Probe connectivity with the cheapest call the provider offers.
    ///
    /// Provider-side failures become `Ok(false)`; local validation and
    /// configuration faults propagate.
    async fn is_connected(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_provider_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The shared API client, for services backed by one. Decorators use
    /// this as a capability marker and must preserve it through the chain.
    fn api_client(&self) -> Option<&ApiClient> {
        None
    }
}

/// A concrete, invocable generative endpoint within a service.
///
/// Every operation a given model does not support returns a typed
/// unsupported error.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Metadata for the resolved model.
    fn metadata(&self) -> &ModelMetadata;

    /// Generate text candidates.
    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        let _ = input;
        Err(ProviderError::unsupported(format!(
            "model `{}` does not support text generation",
            self.metadata().slug
        )))
    }

    /// Generate text candidates incrementally.
    ///
    /// The stream is lazy, single-pass, and not restartable; faults raised
    /// mid-stream surface as `Err` items.
    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        let _ = input;
        Err(ProviderError::unsupported(format!(
            "model `{}` does not support streaming text generation",
            self.metadata().slug
        )))
    }

    /// Generate image candidates.
    async fn generate_image(&self, input: ContentInput) -> Result<Candidates> {
        let _ = input;
        Err(ProviderError::unsupported(format!(
            "model `{}` does not support image generation",
            self.metadata().slug
        )))
    }
}

/// Resolve the model metadata `params` asks for.
///
/// An explicit slug must exist in the listed models. Without one, the
/// capability filter plus the service's preference order picks the default;
/// an empty filter result is reported, never guessed around.
pub async fn resolve_model_metadata(
    service: &dyn Service,
    params: &ModelParams,
) -> Result<ModelMetadata> {
    let mut models = service.list_models().await?;

    match &params.model {
        Some(slug) => models
            .remove(slug)
            .ok_or_else(|| ProviderError::model_not_found(slug.clone())),
        None => {
            let mut slugs = model_slugs_for_capabilities(&models, &params.capabilities);
            if slugs.is_empty() {
                return Err(ProviderError::no_available_model(format!(
                    "service `{}` has no model satisfying the required capabilities",
                    service.metadata().slug
                )));
            }
            service.sort_models_by_preference(&mut slugs);
            models
                .remove(&slugs[0])
                .ok_or_else(|| ProviderError::internal("preferred slug vanished from model list"))
        }
    }
}

/// The capability set used to pick a model implementation for `metadata`.
///
/// Explicit requirements win; otherwise text generation is assumed when the
/// model offers it, and the model's own capabilities drive selection for
/// single-purpose (e.g. image-only) models.
pub fn required_model_capabilities(
    metadata: &ModelMetadata,
    params: &ModelParams,
) -> Vec<Capability> {
    if !params.capabilities.is_empty() {
        return params.capabilities.clone();
    }
    if metadata.capabilities.contains(&Capability::TextGeneration) {
        return vec![Capability::TextGeneration];
    }
    metadata.capabilities.clone()
}
