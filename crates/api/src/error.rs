//! API-boundary error type. Every handler returns `ApiResult<T>`; this is the
//! single place that turns a domain error into an HTTP response, mirroring the
//! shape of the platform's own `AuthError` (`error + code` JSON body) while
//! sourcing the status code from `ErrorKind::status_code()` instead of a
//! hand-matched table per error enum.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use opscore_core::OpsError;
use opscore_shared::error::ErrorKind;
use opscore_shared::tenancy::TenancyError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ops(#[from] OpsError),

    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Ops(e) => e.kind(),
            ApiError::Tenancy(_) => ErrorKind::Forbidden,
            ApiError::RateLimited { .. } => ErrorKind::DependencyUnavailable,
            ApiError::BadRequest(_) => ErrorKind::InvalidState,
            ApiError::Database(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Ops(e) => e.code(),
            ApiError::Tenancy(_) => "org_override_rejected",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Database(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(err) = &self {
            log_db_err(self.code(), err);
        }

        let status = StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.to_string();
        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        let mut response = (status, body).into_response();
        if let ApiError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// Logs a DB error with the fields useful for diagnosing it (the call site's
/// own error code plus whatever sqlx can report about the underlying
/// constraint), without leaking any of that detail into the HTTP response.
fn log_db_err(code: &str, err: &sqlx::Error) {
    if let Some(db_err) = err.as_database_error() {
        tracing::error!(
            code,
            db_code = db_err.code().as_deref().unwrap_or("unknown"),
            constraint = db_err.constraint().unwrap_or("none"),
            message = db_err.message(),
            "database error at api boundary"
        );
    } else {
        tracing::error!(code, error = %err, "database error at api boundary");
    }
}
