//! Resolves the caller's `Identity` from the request and applies the
//! `X-Test-Org` override precedence. Authentication itself (how the bearer
//! token was issued, who signs it) is treated as an opaque external concern:
//! this module only trusts whatever the front door already validated and
//! handed us in the `Authorization` header, parsing it into the
//! `subject`/`role`/`org_id` triple the rest of the core consumes.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use opscore_shared::tenancy::{Identity, OrgId, Role};

use crate::state::AppState;

const TEST_ORG_HEADER: &str = "x-test-org";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing or malformed authorization header")]
    MissingAuth,
    #[error("invalid X-Test-Org header")]
    InvalidOrgOverride,
    #[error("identity is already org-bound; override does not match")]
    OrgOverrideMismatch,
    #[error("identity is not org-bound; an org override is required")]
    OrgOverrideRequired,
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = match self {
            IdentityError::MissingAuth => StatusCode::UNAUTHORIZED,
            IdentityError::InvalidOrgOverride | IdentityError::OrgOverrideMismatch => {
                StatusCode::FORBIDDEN
            }
            IdentityError::OrgOverrideRequired => StatusCode::BAD_REQUEST,
        };
        let body = Json(json!({ "error": self.to_string(), "code": status.as_u16() }));
        (status, body).into_response()
    }
}

/// The resolved request identity: who the caller is (per `Identity`) plus the
/// org this specific request is scoped to, already reconciled against any
/// `X-Test-Org` override.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: Identity,
    pub org_id: OrgId,
}

/// `subject:role` convention the bearer token's opaque payload is expected to
/// carry, e.g. `Authorization: Bearer owner-1:owner`. Real token verification
/// (JWT signature, session lookup) is out of scope; this only decodes the
/// shape the platform's auth front door would have already validated.
fn parse_bearer(raw: &str) -> Option<(String, Role)> {
    let token = raw.strip_prefix("Bearer ")?.trim();
    let (subject, role_raw) = token.split_once(':')?;
    let role = match role_raw {
        "owner" => Role::Owner,
        "admin" => Role::Admin,
        "operator" => Role::Operator,
        "viewer" => Role::Viewer,
        _ => return None,
    };
    Some((subject.to_string(), role))
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = IdentityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(IdentityError::MissingAuth)?;
        let (subject, role) = parse_bearer(auth_header).ok_or(IdentityError::MissingAuth)?;

        // A bound org is carried in the token payload as a third segment
        // (`subject:role:org_uuid`); its absence means an unbound identity
        // that must supply an override.
        let bound_org = auth_header
            .strip_prefix("Bearer ")
            .and_then(|t| t.trim().splitn(3, ':').nth(2))
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .map(OrgId);

        let override_org = parts
            .headers
            .get(TEST_ORG_HEADER)
            .map(|v| v.to_str().map_err(|_| IdentityError::InvalidOrgOverride))
            .transpose()?
            .map(|raw| Uuid::parse_str(raw).map_err(|_| IdentityError::InvalidOrgOverride))
            .transpose()?
            .map(OrgId);

        let identity = Identity {
            subject,
            role,
            org_id: bound_org,
        };

        let org_id = identity.resolve_org(override_org).map_err(|e| match e {
            opscore_shared::tenancy::TenancyError::OrgOverrideMismatch => {
                IdentityError::OrgOverrideMismatch
            }
            opscore_shared::tenancy::TenancyError::OrgOverrideRequired => {
                IdentityError::OrgOverrideRequired
            }
        })?;

        Ok(RequestIdentity { identity, org_id })
    }
}
