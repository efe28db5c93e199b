//! Team resolution and the default-team bootstrap. Grounded on `_team_for_org()`
//! and `ensure_default_team()` in the original scheduler.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::{OpsError, OpsResult};

use super::types::Team;

const DEFAULT_TEAM_NAME: &str = "Default Team";

/// Resolves the team to operate against for a request: the explicitly supplied
/// `team_id` if given, else the org's default team (bootstrapped if it doesn't
/// exist yet). Always re-verifies the resolved team belongs to `org_id`.
pub async fn team_for_org(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    team_id: Option<i64>,
) -> OpsResult<Team> {
    let team = match team_id {
        Some(id) => sqlx::query_as::<_, Team>(
            "SELECT team_id, org_id, name FROM teams WHERE team_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?,
        None => None,
    };

    let team = match team {
        Some(team) => team,
        None => ensure_default_team(tx, org_id).await?,
    };

    if team.org_id != org_id {
        return Err(OpsError::Forbidden {
            reason: "team does not belong to org",
        });
    }

    Ok(team)
}

/// Resolves the team for a brand-new booking: an explicitly supplied
/// `team_id` must exist (and belong to `org_id`) or the call fails with
/// `team_not_found` — it never silently falls back to the default team the
/// way `team_for_org` does for reads/moves. Only the no-`team_id` case
/// bootstraps the org's default team. Grounded on `_resolve_team()` in the
/// original scheduler, which is deliberately distinct from `_team_for_org()`.
pub async fn resolve_team_for_creation(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    team_id: Option<i64>,
) -> OpsResult<Team> {
    let team = match team_id {
        Some(id) => {
            let team = sqlx::query_as::<_, Team>(
                "SELECT team_id, org_id, name FROM teams WHERE team_id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(OpsError::NotFound { entity: "team" })?;

            if team.org_id != org_id {
                return Err(OpsError::NotFound { entity: "team" });
            }
            team
        }
        None => ensure_default_team(tx, org_id).await?,
    };

    Ok(team)
}

/// Idempotent-under-concurrency bootstrap: two concurrent requests for an org
/// with no team yet must not both insert a default team. We use
/// `INSERT ... ON CONFLICT DO NOTHING` against a unique `(org_id, name)`
/// constraint and re-read on conflict, matching the original's
/// savepoint-plus-re-read-on-IntegrityError behavior without needing a nested
/// transaction (Postgres's `ON CONFLICT` already gives us the atomic check).
pub async fn ensure_default_team(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
) -> OpsResult<Team> {
    let inserted = sqlx::query_as::<_, Team>(
        r#"INSERT INTO teams (org_id, name)
           VALUES ($1, $2)
           ON CONFLICT (org_id, name) DO NOTHING
           RETURNING team_id, org_id, name"#,
    )
    .bind(org_id)
    .bind(DEFAULT_TEAM_NAME)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(team) = inserted {
        return Ok(team);
    }

    sqlx::query_as::<_, Team>(
        "SELECT team_id, org_id, name FROM teams WHERE org_id = $1 AND name = $2 FOR UPDATE",
    )
    .bind(org_id)
    .bind(DEFAULT_TEAM_NAME)
    .fetch_one(&mut **tx)
    .await
    .map_err(|_| OpsError::Internal("default team bootstrap raced and re-read found nothing".into()))
}
