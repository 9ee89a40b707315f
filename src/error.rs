// SPDX-License-Identifier: MIT

//! Typed error handling for trellis-rs.
//!
//! The taxonomy follows the run-level failure semantics of the engine:
//! configuration errors are fatal and abort the run, model errors propagate
//! to the caller, retrieval errors are handled by the step that issued the
//! lookup, validation errors are rejected before any step executes.

use thiserror::Error;

/// Top-level error type for trellis-rs
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration errors (malformed graph, missing edge, bad entry point)
    #[error("configuration error: {0}")]
    Config(String),

    /// A routing function returned a destination outside its declared set
    #[error("step '{step}' routed to undeclared destination '{dest}'")]
    RouteNotAllowed { step: String, dest: String },

    /// Executor reached a step name with no registered step
    #[error("unknown step: '{0}'")]
    UnknownStep(String),

    /// Tool dispatch found no handler for a requested invocation
    #[error("tool '{0}' is not registered")]
    UnregisteredTool(String),

    /// Bad caller input (malformed resume payload, missing scratch field)
    #[error("validation error: {0}")]
    Validation(String),

    /// Resume was requested for a session with no persisted checkpoint
    #[error("no checkpoint found for session '{0}'")]
    UnknownSession(String),

    /// Generation service failure, surfaced as a run-level failure
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Checkpoint store failures
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Generation-service errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Non-success status from the provider
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Response body did not have the expected shape
    #[error("invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP transport errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Retrieval-service errors. Callers degrade to an empty context on these
/// rather than failing the run.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to read document corpus: {0}")]
    Corpus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
