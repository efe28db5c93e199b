//! The error kind taxonomy every domain error enum in this workspace maps onto, and
//! a small `SharedError` for failures that originate in shared infrastructure itself
//! (config parsing, pool construction, rate limiting).

use thiserror::Error;

/// Stable classification used at the HTTP boundary to pick a status code. Domain
/// error enums (`SchedulingError`, `PaymentError`, `OutboxError`, …) each expose a
/// `kind(&self) -> ErrorKind` so `opscore-api` has one place that maps kind to status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidState,
    Precondition,
    DependencyUnavailable,
    DependencyProtocol,
    /// An external dependency was reachable but answered with an error (e.g. a
    /// non-circuit-open Stripe API failure). Distinct from `DependencyProtocol`
    /// (a 400-class error caused by our own payload/signature being wrong) and
    /// from `DependencyUnavailable` (503, circuit open / not configured).
    UpstreamError,
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to at the API boundary.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidState => 400,
            ErrorKind::Precondition => 412,
            ErrorKind::DependencyUnavailable => 503,
            ErrorKind::DependencyProtocol => 400,
            ErrorKind::UpstreamError => 502,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("missing required env var {0}")]
    MissingEnv(String),

    #[error("invalid value for env var {name}: {detail}")]
    InvalidEnv { name: String, detail: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl From<sqlx::Error> for SharedError {
    fn from(err: sqlx::Error) -> Self {
        SharedError::Database(err.to_string())
    }
}

impl SharedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SharedError::MissingEnv(_) | SharedError::InvalidEnv { .. } => ErrorKind::Internal,
            SharedError::Database(_) => ErrorKind::Internal,
            SharedError::RateLimited { .. } => ErrorKind::DependencyUnavailable,
        }
    }
}
