//! Provider integrations for AI Services.
//!
//! This crate turns the common value model of `aiservices-core` into calls
//! against real generative-AI HTTP APIs:
//! - Google Gemini
//! - Mistral
//! - Perplexity
//! - xAI (Grok)
//! - an in-process mock for tests
//!
//! plus the authentication strategies, the shared API client, the caching
//! and pass-through decorators, and the service registry callers enter
//! through.
//!
//! # Example
//!
//! ```rust,ignore
//! use aiservices_providers::{ContentInput, MistralService, ModelParams, Service};
//! use aiservices_core::Capability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = MistralService::from_env()?;
//!
//!     let model = service
//!         .get_model(ModelParams::new().require(Capability::TextGeneration))
//!         .await?;
//!
//!     let candidates = model.generate_text(ContentInput::from("Hello!")).await?;
//!     println!("{}", candidates.first_text().unwrap_or_default());
//!
//!     Ok(())
//! }
//! ```

mod error;

pub mod auth;
pub mod cache;
pub mod client;
pub mod decorator;
pub mod google;
pub mod mistral;
pub mod mock;
pub mod openai_compatible;
pub mod perplexity;
pub mod registry;
pub mod service;
pub mod xai;

pub use auth::{ApiKey, AuthHeader};
pub use cache::{CachedService, InMemoryTransients, TransientStore};
pub use client::{ApiClient, JsonStream, RequestOptions};
pub use decorator::{ApiClientServiceDecorator, ServiceDecorator};
pub use error::{ProviderError, Result};
pub use google::GoogleService;
pub use mistral::MistralService;
pub use mock::MockService;
pub use perplexity::PerplexityService;
pub use registry::ServiceRegistry;
pub use service::{
    CandidatesStream, ContentInput, GenerativeModel, ModelParams, Service,
};
pub use xai::XaiService;
