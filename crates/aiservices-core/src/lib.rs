//! # aiservices-core
//!
//! Content value model, capability vocabulary, and core errors for AI
//! Services.
//!
//! This crate provides the provider-independent data model shared by every
//! provider integration:
//!
//! - **Types**: [`Part`], [`Content`], [`Candidates`], [`Tool`],
//!   [`GenerationConfig`], and model/service metadata
//! - **Capabilities**: the closed [`Capability`] vocabulary and the
//!   negotiation helpers that match requirements against it
//!
//! Everything here is constructed per request from caller input or a parsed
//! provider response; nothing is persisted by this crate.

pub mod capability;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use capability::Capability;
pub use error::{Error, Result};
pub use types::*;
