//! # Error Handling
//!
//! Structured error type shared by every crate in the workspace. Each error
//! carries a [`ErrorKind`] that maps onto an HTTP status, a user-facing
//! message, and an optional internal detail that is logged but never
//! serialized into API responses.

use serde::Serialize;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error classes recognized by the control plane.
///
/// The HTTP surface serializes the class into the response status; everything
/// below the HTTP layer only reasons about the class, never about raw status
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed body, weak password, bad query parameters.
    Validation,
    /// Missing, malformed, expired, wrong-algorithm, or wrong-type token.
    Unauthenticated,
    /// Role missing or account locked.
    Forbidden,
    /// Resource absent.
    NotFound,
    /// Uniqueness violation (username/email, duplicate names).
    Conflict,
    /// Client exceeded the per-IP request budget.
    RateLimited,
    /// A telemetry backend is unavailable or timed out.
    Upstream,
    /// Unexpected persistence or runtime failure.
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Internal detail for logs only. Never reaches an API response.
    pub detail: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// Errors that warrant a security-audit log line rather than debug noise.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthenticated | ErrorKind::Forbidden | ErrorKind::RateLimited
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::not_found("Resource not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::conflict("Resource already exists").with_detail(db.to_string())
            }
            _ => Error::internal("Database error").with_detail(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal("Serialization error").with_detail(err.to_string())
    }
}

/// Serializes the error into the JSON envelope used on every error path:
/// `{status:"error", code, error, timestamp}`. Internal detail is logged,
/// never sent to the client.
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                kind = ?self.kind,
                detail = self.detail.as_deref().unwrap_or(""),
                "Request failed: {}",
                self.message
            );
        } else if self.is_security_relevant() {
            tracing::warn!(kind = ?self.kind, "Request rejected: {}", self.message);
        } else {
            tracing::debug!(kind = ?self.kind, "Client error: {}", self.message);
        }

        let body = axum::Json(serde_json::json!({
            "status": "error",
            "code": status.as_u16(),
            "error": self.message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        let mut response = (status, body).into_response();
        if self.kind == ErrorKind::RateLimited {
            response.headers_mut().insert(
                "Retry-After",
                axum::http::HeaderValue::from_static("60"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(Error::validation("x").http_status(), 400);
        assert_eq!(Error::unauthenticated("x").http_status(), 401);
        assert_eq!(Error::forbidden("x").http_status(), 403);
        assert_eq!(Error::not_found("x").http_status(), 404);
        assert_eq!(Error::conflict("x").http_status(), 409);
        assert_eq!(Error::rate_limited("x").http_status(), 429);
        assert_eq!(Error::upstream("x").http_status(), 502);
        assert_eq!(Error::internal("x").http_status(), 500);
    }

    #[test]
    fn detail_stays_out_of_display() {
        let err = Error::internal("Database error").with_detail("connection refused on 5432");
        assert_eq!(err.to_string(), "Database error");
        assert_eq!(err.detail.as_deref(), Some("connection refused on 5432"));
    }

    #[test]
    fn security_relevance_classification() {
        assert!(Error::unauthenticated("x").is_security_relevant());
        assert!(Error::forbidden("x").is_security_relevant());
        assert!(Error::rate_limited("x").is_security_relevant());
        assert!(!Error::validation("x").is_security_relevant());
        assert!(!Error::internal("x").is_security_relevant());
    }
}
