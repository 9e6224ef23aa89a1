use axum::{http::StatusCode, response::Json};
use std::collections::HashMap;
use tracing::{error, warn};

use crate::api::ApiResponse;
use crate::models::{SourceErrorInfo, SourceName};

/// Raised by the source fetcher only when every source came back empty and at
/// least one of them failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("question bank index missing: {message}")]
    MissingIndex {
        message: String,
        errors: HashMap<SourceName, SourceErrorInfo>,
    },

    #[error("class question source failed: {message}")]
    ClassSourceFailure {
        message: String,
        errors: HashMap<SourceName, SourceErrorInfo>,
    },

    #[error("all question sources failed: {message}")]
    AllSourcesFailed {
        message: String,
        errors: HashMap<SourceName, SourceErrorInfo>,
    },
}

impl FetchError {
    /// Pick the most actionable classification for a set of source failures.
    pub fn escalate(errors: HashMap<SourceName, SourceErrorInfo>) -> Self {
        use crate::bank_store::SourceErrorKind;

        let mut ordered: Vec<(&SourceName, &SourceErrorInfo)> = errors.iter().collect();
        ordered.sort_by_key(|(name, _)| **name);

        if let Some((source, info)) = ordered.iter().find(|(_, info)| info.kind == SourceErrorKind::Index) {
            let message = format!("{}: {}", source, info.message);
            return FetchError::MissingIndex { message, errors };
        }

        if let Some(info) = errors.get(&SourceName::ClassQuestions) {
            let message = info.message.clone();
            return FetchError::ClassSourceFailure { message, errors };
        }

        let message = ordered
            .iter()
            .map(|(source, info)| format!("{}: {}", source, info.message))
            .collect::<Vec<_>>()
            .join("; ");
        FetchError::AllSourcesFailed { message, errors }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::MissingIndex { .. } => "missing-index",
            FetchError::ClassSourceFailure { .. } => "class-source-failure",
            FetchError::AllSourcesFailed { .. } => "all-sources-failed",
        }
    }

    pub fn source_errors(&self) -> &HashMap<SourceName, SourceErrorInfo> {
        match self {
            FetchError::MissingIndex { errors, .. }
            | FetchError::ClassSourceFailure { errors, .. }
            | FetchError::AllSourcesFailed { errors, .. } => errors,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("Question sources unavailable: {0}")]
    SourceUnavailable(#[from] AssemblyError),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                (StatusCode::BAD_REQUEST, Json(ApiResponse::error(self.to_string())))
            }
            ApiError::SourceUnavailable(AssemblyError::Fetch(fetch_error)) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = fetch_error.kind(),
                    error = %self,
                    "Question sources unavailable"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(format!(
                        "{}: {}",
                        fetch_error.kind(),
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| "No questions could be loaded. Please try again.".to_string())
                    ))),
                )
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error("Database operation failed. Please try again.".to_string())),
                )
            }
        }
    }
}
