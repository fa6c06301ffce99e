//! Core error types.

use thiserror::Error;

/// Fatal model errors.
///
/// These abort the in-progress operation (`load_machine`, `reset` or
/// `trigger`) without publishing a partial status. Recoverable guard and
/// action failures never surface here; they go through the
/// [`ErrorReporter`](crate::traits::ErrorReporter) collaborator instead.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no state machine loaded")]
    NotConfigured,

    #[error("invalid chart definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("duplicate state id: {id}")]
    DuplicateId { id: String },

    #[error("unknown transition target: {id}")]
    UnknownTarget { id: String },

    #[error("state '{id}' has no default-initial descendant")]
    MissingInitial { id: String },

    #[error("malformed history state: {reason}")]
    MalformedHistory { reason: String },

    #[error("invalid expression: {reason}")]
    InvalidExpression { reason: String },

    #[error("chart not found: {machine} v{version}")]
    ChartVersionNotFound { machine: String, version: u32 },

    #[error("chart version already exists: {machine} v{version}")]
    ChartVersionExists { machine: String, version: u32 },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("instance already exists: {instance_id}")]
    InstanceExists { instance_id: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Returns an error code suitable for embedding-facing responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ModelError::NotConfigured => "NOT_CONFIGURED",
            ModelError::InvalidDefinition { .. } => "BAD_DEFINITION",
            ModelError::DuplicateId { .. } => "BAD_DEFINITION",
            ModelError::UnknownTarget { .. } => "BAD_DEFINITION",
            ModelError::MissingInitial { .. } => "BAD_DEFINITION",
            ModelError::MalformedHistory { .. } => "BAD_DEFINITION",
            ModelError::InvalidExpression { .. } => "BAD_EXPRESSION",
            ModelError::ChartVersionNotFound { .. } => "CHART_NOT_FOUND",
            ModelError::ChartVersionExists { .. } => "CHART_VERSION_EXISTS",
            ModelError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            ModelError::InstanceExists { .. } => "INSTANCE_EXISTS",
            ModelError::Json(_) => "BAD_REQUEST",
        }
    }
}
