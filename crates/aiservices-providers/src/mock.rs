//! Mock provider for tests.
//!
//! Implements the same contracts as the real providers without any network
//! traffic. Responses resolve from registered content matchers, then from a
//! fixed expected result, then from a deterministic default. A missing
//! expectation is never an error, to keep test authoring low-friction.

use crate::client::ApiClient;
use crate::error::{ProviderError, Result};
use crate::service::{
    required_model_capabilities, resolve_model_metadata, CandidatesStream, ContentInput,
    GenerativeModel, ModelParams, Service,
};
use aiservices_core::capability::select_by_capabilities;
use aiservices_core::{
    Candidate, Candidates, Capability, Content, FinishReason, ModelMetadata, ServiceKind,
    ServiceMetadata,
};
use async_trait::async_trait;
use futures::stream;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Text returned when no expectation matches.
const DEFAULT_RESPONSE: &str = "This is a mock response.";

const TEXT_MODEL_CAPS: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatHistory,
    Capability::MultimodalInput,
    Capability::FunctionCalling,
    Capability::WebSearch,
];

const IMAGE_MODEL_CAPS: &[Capability] =
    &[Capability::ImageGeneration, Capability::MultimodalOutput];

/// Predicate over the normalized input; the first matcher returning
/// `Some` wins.
pub type ContentMatcher = Box<dyn Fn(&[Content]) -> Option<Candidates> + Send + Sync>;

struct MockState {
    matchers: Mutex<Vec<ContentMatcher>>,
    expected: Mutex<Option<Candidates>>,
    text_calls: AtomicU64,
    stream_calls: AtomicU64,
    image_calls: AtomicU64,
}

impl MockState {
    fn resolve(&self, history: &[Content]) -> Candidates {
        let matchers = self.matchers.lock().unwrap();
        for matcher in matchers.iter() {
            if let Some(candidates) = matcher(history) {
                return candidates;
            }
        }
        drop(matchers);

        if let Some(expected) = self.expected.lock().unwrap().clone() {
            return expected;
        }

        single_text_candidates(DEFAULT_RESPONSE)
    }
}

fn single_text_candidates(text: &str) -> Candidates {
    let mut candidates = Candidates::new();
    candidates.push(Candidate::new(Content::model(text)).with_finish_reason(FinishReason::Stop));
    candidates
}

enum ModelFlavor {
    Text,
    Image,
}

/// In-process mock service.
pub struct MockService {
    metadata: ServiceMetadata,
    state: Arc<MockState>,
}

impl MockService {
    /// Service slug.
    pub const SLUG: &'static str = "mock";

    /// Create a mock service with no expectations.
    pub fn new() -> Self {
        Self {
            metadata: ServiceMetadata::new(Self::SLUG, "Mock", ServiceKind::Client, ""),
            state: Arc::new(MockState {
                matchers: Mutex::new(Vec::new()),
                expected: Mutex::new(None),
                text_calls: AtomicU64::new(0),
                stream_calls: AtomicU64::new(0),
                image_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Expect every unmatched call to produce a single model candidate with
    /// this text.
    pub fn expect_content(&self, text: impl Into<String>) {
        let text = text.into();
        *self.state.expected.lock().unwrap() = Some(single_text_candidates(&text));
    }

    /// Expect every unmatched call to produce these candidates.
    pub fn expect_candidates(&self, candidates: Candidates) {
        *self.state.expected.lock().unwrap() = Some(candidates);
    }

    /// Register a content matcher; matchers run in registration order and
    /// the first non-`None` result wins.
    pub fn expect_with<F>(&self, matcher: F)
    where
        F: Fn(&[Content]) -> Option<Candidates> + Send + Sync + 'static,
    {
        self.state.matchers.lock().unwrap().push(Box::new(matcher));
    }

    /// Drop all expectations and matchers.
    pub fn reset(&self) {
        self.state.matchers.lock().unwrap().clear();
        *self.state.expected.lock().unwrap() = None;
    }

    /// Number of buffered text generations performed.
    pub fn text_calls(&self) -> u64 {
        self.state.text_calls.load(Ordering::Relaxed)
    }

    /// Number of streamed text generations performed.
    pub fn stream_calls(&self) -> u64 {
        self.state.stream_calls.load(Ordering::Relaxed)
    }

    /// Number of image generations performed.
    pub fn image_calls(&self) -> u64 {
        self.state.image_calls.load(Ordering::Relaxed)
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for MockService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn list_models(&self) -> Result<BTreeMap<String, ModelMetadata>> {
        let mut models = BTreeMap::new();
        models.insert(
            "mock-text".to_string(),
            ModelMetadata::new("mock-text", "", TEXT_MODEL_CAPS.to_vec()),
        );
        models.insert(
            "mock-image".to_string(),
            ModelMetadata::new("mock-image", "", IMAGE_MODEL_CAPS.to_vec()),
        );
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
            ModelFlavor::Text => Box::new(MockModel {
                metadata,
                state: Arc::clone(&self.state),
            }),
            ModelFlavor::Image => Box::new(MockImageModel {
                metadata,
                state: Arc::clone(&self.state),
            }),
        })
    }

    /// The text model is the sensible default when the caller names no
    /// capability.
    fn sort_models_by_preference(&self, slugs: &mut [String]) {
        slugs.sort_by_key(|slug| (slug.as_str() != "mock-text", slug.clone()));
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(true)
    }

    fn api_client(&self) -> Option<&ApiClient> {
        None
    }
}

/// Mock text model.
pub struct MockModel {
    metadata: ModelMetadata,
    state: Arc<MockState>,
}

#[async_trait]
impl GenerativeModel for MockModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_text(&self, input: ContentInput) -> Result<Candidates> {
        self.state.text_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.state.resolve(&input.into_history()))
    }

    async fn stream_generate_text(&self, input: ContentInput) -> Result<CandidatesStream> {
        self.state.stream_calls.fetch_add(1, Ordering::Relaxed);
        let state = Arc::clone(&self.state);
        let history = input.into_history();
        // One chunk carrying the whole resolved result, produced lazily on
        // first poll.
        let stream = stream::once(async move { Ok(state.resolve(&history)) });
        Ok(Box::pin(stream))
    }
}

/// Mock image model.
pub struct MockImageModel {
    metadata: ModelMetadata,
    state: Arc<MockState>,
}

#[async_trait]
impl GenerativeModel for MockImageModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn generate_image(&self, input: ContentInput) -> Result<Candidates> {
        self.state.image_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.state.resolve(&input.into_history()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiservices_core::ContentRole;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_expected_content_round_trip() {
        let service = MockService::new();
        service.expect_content("Hello back");

        let model = service.get_model(ModelParams::new()).await.unwrap();
        let candidates = model.generate_text(ContentInput::from("Hi")).await.unwrap();

        assert_eq!(candidates.len(), 1);
        let candidate = candidates.first().unwrap();
        assert_eq!(candidate.content.role, ContentRole::Model);
        assert_eq!(candidate.content.parts.len(), 1);
        assert_eq!(candidates.first_text().as_deref(), Some("Hello back"));
        assert_eq!(service.text_calls(), 1);
    }

    #[tokio::test]
    async fn test_matcher_queue_first_match_wins() {
        let service = MockService::new();
        service.expect_with(|history| {
            history
                .iter()
                .any(|c| c.text().contains("weather"))
                .then(|| single_text_candidates("Sunny"))
        });
        service.expect_with(|_| Some(single_text_candidates("Fallback matcher")));
        service.expect_content("Fixed expectation");

        let model = service.get_model(ModelParams::new()).await.unwrap();

        let candidates = model
            .generate_text(ContentInput::from("what's the weather?"))
            .await
            .unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some("Sunny"));

        let candidates = model
            .generate_text(ContentInput::from("anything else"))
            .await
            .unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some("Fallback matcher"));
    }

    #[tokio::test]
    async fn test_default_response_without_expectations() {
        let service = MockService::new();
        let model = service.get_model(ModelParams::new()).await.unwrap();

        let candidates = model.generate_text(ContentInput::from("Hi")).await.unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some(DEFAULT_RESPONSE));
    }

    #[tokio::test]
    async fn test_stream_yields_exactly_one_chunk() {
        let service = MockService::new();
        service.expect_content("Streamed");

        let model = service.get_model(ModelParams::new()).await.unwrap();
        let mut stream = model
            .stream_generate_text(ContentInput::from("Hi"))
            .await
            .unwrap();

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.first_text().as_deref(), Some("Streamed"));

        // Single-pass: once drained the stream stays empty.
        assert!(stream.next().await.is_none());
        assert_eq!(service.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_image_model_resolution() {
        let service = MockService::new();
        let model = service
            .get_model(ModelParams::new().require(Capability::ImageGeneration))
            .await
            .unwrap();

        assert_eq!(model.metadata().slug, "mock-image");
        let candidates = model
            .generate_image(ContentInput::from("a balloon"))
            .await
            .unwrap();
        assert!(!candidates.is_empty());

        // Text generation is not part of the image model's contract.
        let err = model.generate_text(ContentInput::from("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_explicit_model_not_found() {
        let service = MockService::new();
        let err = service
            .get_model(ModelParams::new().with_model("mock-unknown"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_restores_default() {
        let service = MockService::new();
        service.expect_content("Something");
        service.reset();

        let model = service.get_model(ModelParams::new()).await.unwrap();
        let candidates = model.generate_text(ContentInput::from("Hi")).await.unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some(DEFAULT_RESPONSE));
    }
}
