//! Common value types shared by every provider integration.

mod candidate;
mod content;
mod generation_config;
mod model;
mod part;
mod tool;

pub use candidate::{Candidate, Candidates, FinishReason};
pub use content::{Content, ContentRole};
pub use generation_config::GenerationConfig;
pub use model::{ModelMetadata, ServiceKind, ServiceMetadata};
pub use part::Part;
pub use tool::{sanitize_parameters_schema, FunctionDeclaration, Tool};
