//! Domain error taxonomy for the Operations Core. Every fallible operation in this
//! crate returns `OpsError` (or a narrower alias); `opscore-api` maps `kind()` onto
//! an HTTP status at the single boundary point rather than each handler guessing.

use opscore_shared::error::ErrorKind;
use thiserror::Error;

pub type OpsResult<T> = Result<T, OpsError>;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("invalid window: ends_at must be after starts_at")]
    InvalidWindow,

    #[error("invalid transition: {reason}")]
    InvalidTransition { reason: &'static str },

    #[error("precondition failed: {reason}")]
    Precondition { reason: &'static str },

    #[error("dependency unavailable: {reason}")]
    DependencyUnavailable { reason: &'static str },

    #[error("dependency protocol error: {code}")]
    DependencyProtocol { code: &'static str },

    #[error("upstream error: {code}")]
    UpstreamError { code: &'static str },

    #[error("internal error: {0}")]
    Internal(String),
}

impl OpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::NotFound { .. } => ErrorKind::NotFound,
            OpsError::Forbidden { .. } => ErrorKind::Forbidden,
            OpsError::Conflict { .. } => ErrorKind::Conflict,
            OpsError::InvalidWindow | OpsError::InvalidTransition { .. } => ErrorKind::InvalidState,
            OpsError::Precondition { .. } => ErrorKind::Precondition,
            OpsError::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            OpsError::DependencyProtocol { .. } => ErrorKind::DependencyProtocol,
            OpsError::UpstreamError { .. } => ErrorKind::UpstreamError,
            OpsError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, independent of the Display message, for
    /// clients that want to branch on error identity (`slot_unavailable`,
    /// `ambiguous_metadata`, …) rather than parse prose.
    pub fn code(&self) -> &'static str {
        match self {
            OpsError::NotFound { .. } => "not_found",
            OpsError::Forbidden { .. } => "forbidden",
            OpsError::Conflict { .. } => "conflict",
            OpsError::InvalidWindow => "invalid_window",
            OpsError::InvalidTransition { .. } => "invalid_transition",
            OpsError::Precondition { .. } => "precondition_failed",
            OpsError::DependencyUnavailable { .. } => "dependency_unavailable",
            OpsError::DependencyProtocol { code } => code,
            OpsError::UpstreamError { code } => code,
            OpsError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        OpsError::Internal(format!("db error: {err}"))
    }
}
