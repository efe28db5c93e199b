//! Tenancy resolution. Authentication/authorization schemes themselves are out of
//! scope (per the spec, treated as an opaque external collaborator); this module
//! only models the shape of the resolved identity the rest of the core consumes,
//! and the org-scoping convention every query must follow.

use std::fmt;

use uuid::Uuid;

/// Tenant boundary. All entity reads and writes are scoped by it; no cross-org
/// reference is ever legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrgId(pub Uuid);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrgId {
    fn from(value: Uuid) -> Self {
        OrgId(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Admin,
    Operator,
    Viewer,
}

/// The caller's resolved identity: who they are and which org (if any) they're
/// bound to. Produced upstream by whatever auth scheme the platform uses; the
/// Operations Core only ever sees this struct.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
    /// `None` means the identity is not org-bound (e.g. a platform-level
    /// superadmin) and must supply an explicit org via `X-Test-Org`.
    pub org_id: Option<OrgId>,
}

impl Identity {
    /// Resolve the effective org for a request: the identity's bound org, or (only
    /// when unbound) the caller-supplied override. A bound identity supplying a
    /// mismatched override is a `forbidden` error at the API boundary, not handled
    /// here — this helper only implements the "which org wins" precedence.
    pub fn resolve_org(&self, override_org: Option<OrgId>) -> Result<OrgId, TenancyError> {
        match (self.org_id, override_org) {
            (Some(bound), None) => Ok(bound),
            (Some(bound), Some(requested)) if bound == requested => Ok(bound),
            (Some(_), Some(_)) => Err(TenancyError::OrgOverrideMismatch),
            (None, Some(requested)) => Ok(requested),
            (None, None) => Err(TenancyError::OrgOverrideRequired),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    #[error("identity is already org-bound; override does not match")]
    OrgOverrideMismatch,
    #[error("identity is not org-bound; an org override is required")]
    OrgOverrideRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(n: u128) -> OrgId {
        OrgId(Uuid::from_u128(n))
    }

    #[test]
    fn bound_identity_without_override_uses_bound_org() {
        let identity = Identity {
            subject: "u1".into(),
            role: Role::Admin,
            org_id: Some(org(1)),
        };
        assert_eq!(identity.resolve_org(None).unwrap(), org(1));
    }

    #[test]
    fn bound_identity_with_mismatched_override_is_rejected() {
        let identity = Identity {
            subject: "u1".into(),
            role: Role::Admin,
            org_id: Some(org(1)),
        };
        assert!(identity.resolve_org(Some(org(2))).is_err());
    }

    #[test]
    fn unbound_identity_requires_override() {
        let identity = Identity {
            subject: "svc".into(),
            role: Role::Owner,
            org_id: None,
        };
        assert!(identity.resolve_org(None).is_err());
        assert_eq!(identity.resolve_org(Some(org(9))).unwrap(), org(9));
    }
}
