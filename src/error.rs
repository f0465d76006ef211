use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::{access::Denial, store::StoreError};

/// Errors surfaced at the HTTP boundary. Every variant renders the same envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, details: Value },
    #[error("{0}")]
    Authentication(String),
    #[error("{message}")]
    Authorization { message: String, reason: &'static str },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Dependency { message: String, details: Value },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub details: Value,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn dependency(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Dependency {
            message: message.into(),
            details: json!({ "error": cause.to_string() }),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Dependency { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Authentication(_) => "AuthenticationError",
            Self::Authorization { .. } => "AuthorizationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::Dependency { .. } => "DependencyError",
            Self::Internal(_) => "InternalServerError",
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        let (message, details) = match self {
            Self::Validation { message, details } | Self::Dependency { message, details } => {
                (message.clone(), details.clone())
            }
            Self::Authorization { message, reason } => {
                (message.clone(), json!({ "reason": reason }))
            }
            // Only the top-level message; the source chain stays in the logs.
            Self::Internal(e) => (
                "An unexpected error occurred".to_string(),
                json!({ "error": e.to_string() }),
            ),
            other => (other.to_string(), json!({})),
        };
        ErrorEnvelope {
            success: false,
            kind: self.kind(),
            message,
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, %status, "request failed");
        }
        (status, Json(self.envelope())).into_response()
    }
}

impl From<Denial> for AppError {
    fn from(d: Denial) -> Self {
        Self::Authorization {
            message: d.to_string(),
            reason: d.code(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(e) => Self::Internal(anyhow::Error::new(e).context("database")),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(r: JsonRejection) -> Self {
        Self::Validation {
            message: "Invalid request body".into(),
            details: json!({ "error": r.body_text() }),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(r: QueryRejection) -> Self {
        Self::Validation {
            message: "Invalid query parameters".into(),
            details: json!({ "error": r.body_text() }),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(r: PathRejection) -> Self {
        Self::Validation {
            message: "Invalid path parameter".into(),
            details: json!({ "error": r.body_text() }),
        }
    }
}

/// `Json` whose rejection is rendered as a `ValidationError` envelope.
#[derive(axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);
