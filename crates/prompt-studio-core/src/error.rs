//! Error taxonomy shared by the core and the application.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`Configuration`](StudioError::Configuration) | Required provider credentials or settings are missing |
//! | [`Validation`](StudioError::Validation) | Malformed template or unsupported input |
//! | [`Provider`](StudioError::Provider) | An external call failed after any applicable retries |
//! | [`NotFound`](StudioError::NotFound) | Unknown document or chunk id |
//! | [`Storage`](StudioError::Storage) | Persisted index state could not be read or written |

use thiserror::Error;

/// Pipeline step names carried by [`StudioError::Provider`].
pub mod step {
    pub const EMBEDDING: &str = "embedding";
    pub const GENERATION: &str = "generation";
    pub const EVALUATION: &str = "evaluation";
    pub const CONTEXT_ASSESSMENT: &str = "context_assessment";
    pub const INITIAL_QUERY: &str = "initial_query";
    pub const QUERY_REFINEMENT: &str = "query_refinement";
    pub const DEADLINE: &str = "deadline";
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{step} failed: {message}")]
    Provider { step: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StudioError {
    /// Wrap any displayable failure as a provider error for `step`.
    pub fn provider<E: std::fmt::Display>(step: &'static str, err: E) -> Self {
        StudioError::Provider {
            step,
            message: err.to_string(),
        }
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        StudioError::Storage(err.to_string())
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StudioError::Configuration(_) => "configuration_error",
            StudioError::Validation(_) => "validation_error",
            StudioError::Provider { .. } => "provider_error",
            StudioError::NotFound(_) => "not_found",
            StudioError::Storage(_) => "storage_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
