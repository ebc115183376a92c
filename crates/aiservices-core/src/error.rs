//! Error types for the AI Services core value model.

use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing or negotiating core value types.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed value data (missing or mistyped field).
    #[error("Invalid data: {0}")]
    Validation(String),

    /// No candidate satisfies the required capability set.
    #[error("No candidate satisfies the required capabilities: {0}")]
    UnsatisfiableCapabilities(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unsatisfiable-capabilities error.
    pub fn unsatisfiable(message: impl Into<String>) -> Self {
        Self::UnsatisfiableCapabilities(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("part must contain exactly one variant");
        assert!(err.to_string().contains("Invalid data"));

        let err = Error::unsatisfiable("image_generation");
        assert!(err.to_string().contains("image_generation"));
    }
}
