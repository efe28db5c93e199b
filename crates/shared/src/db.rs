//! Connection pool construction. Mirrors the platform's existing `sqlx`-based
//! pool setup: one pool, constructed once, cloned (cheap, it's an `Arc` internally)
//! into every service that needs it.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::SharedError;

pub async fn create_pool(database_url: &str) -> Result<PgPool, SharedError> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
        .map_err(SharedError::from)
}

/// A smaller pool for one-off migration/admin connections, so the main pool's
/// connection budget isn't consumed by startup migrations.
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, SharedError> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(SharedError::from)
}
