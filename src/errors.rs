use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Malformed input (configuration, run options, oversized chunks).
    BadRequest(String),
    /// A workflow payload that is not valid JSON for its options type.
    ParseError(String),
    /// A website that yields no usable host.
    InvalidDomain(String),
    /// Resource not found error.
    NotFound(String),
    /// The request never produced a response (connect failure, timeout, broken body).
    TransportError(String),
    /// An upstream service answered with a non-success status.
    UpstreamStatus {
        /// Which upstream answered ("salesforce", "harmonic").
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the caller if needed.
        body: String,
    },
    /// Error interacting with an external API that is not status related (bad payloads).
    ExternalApiError(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Whether retrying the same unit of work may succeed.
    ///
    /// Input errors and payload errors are never transient; transport failures,
    /// throttling and upstream 5xx are.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::TransportError(_) => true,
            AppError::DatabaseError(e) => !matches!(e, sqlx::Error::RowNotFound),
            AppError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::InvalidDomain(msg) => write!(f, "Invalid domain: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::TransportError(msg) => write!(f, "Transport error: {}", msg),
            AppError::UpstreamStatus {
                service,
                status,
                body,
            } => write!(f, "{} returned {}: {}", service, status, body),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::DatabaseError(e) => Some(e),
            AppError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::BadRequest(msg) | AppError::ParseError(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::InvalidDomain(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::TransportError(_)
            | AppError::UpstreamStatus { .. }
            | AppError::ExternalApiError(_) => {
                tracing::error!("Upstream failure: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Clone for AppError {
    /// Clones the error.
    ///
    /// `sqlx::Error` is not cloneable, so `DatabaseError` keeps only its message, as a
    /// `Protocol` error, which stays transient.
    fn clone(&self) -> Self {
        match self {
            AppError::DatabaseError(e) => {
                AppError::DatabaseError(sqlx::Error::Protocol(e.to_string()))
            }
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::ParseError(msg) => AppError::ParseError(msg.clone()),
            AppError::InvalidDomain(msg) => AppError::InvalidDomain(msg.clone()),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::TransportError(msg) => AppError::TransportError(msg.clone()),
            AppError::UpstreamStatus {
                service,
                status,
                body,
            } => AppError::UpstreamStatus {
                service: *service,
                status: *status,
                body: body.clone(),
            },
            AppError::ExternalApiError(msg) => AppError::ExternalApiError(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    /// Send-side failures (connect, timeout, body) are transport errors; anything else
    /// is a malformed exchange with the upstream.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            AppError::TransportError(err.to_string())
        } else {
            AppError::ExternalApiError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
