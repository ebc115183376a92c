//! Error types for provider integrations.

use thiserror::Error;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Provider error types.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication error (invalid API key, etc.).
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message}. Retry after {retry_after:?} seconds")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Invalid request (bad parameters, unsupported tool, etc.).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found within the service.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// No model of the service satisfies the required capabilities.
    #[error("No available model: {0}")]
    NoAvailableModel(String),

    /// No registered service satisfies the required capabilities.
    #[error("No available service: {0}")]
    NoAvailableService(String),

    /// A decoded provider response lacks an expected key.
    #[error("Provider response is missing the `{0}` key")]
    MissingResponseKey(String),

    /// Server error from the provider.
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stream error.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration error (empty API key, decorator misuse, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation for this model.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Malformed value data.
    #[error("Invalid data: {0}")]
    Validation(#[from] aiservices_core::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound(model.into())
    }

    /// Create a no-available-model error.
    pub fn no_available_model(message: impl Into<String>) -> Self {
        Self::NoAvailableModel(message.into())
    }

    /// Create a no-available-service error.
    pub fn no_available_service(message: impl Into<String>) -> Self {
        Self::NoAvailableService(message.into())
    }

    /// Create a missing-response-key error.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingResponseKey(key.into())
    }

    /// Create a server error.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Create a stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error came back from the provider rather than from
    /// local validation or configuration. The connectivity probe converts
    /// exactly these into a boolean `false`.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::RateLimit { .. }
                | Self::InvalidRequest(_)
                | Self::MissingResponseKey(_)
                | Self::ServerError { .. }
                | Self::Network(_)
                | Self::Stream(_)
        )
    }

    /// Check if this error is retryable by a caller that chooses to retry.
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Network(_) => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
