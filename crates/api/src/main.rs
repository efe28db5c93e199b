// API server clippy configuration
#![allow(clippy::useless_vec)]
#![allow(clippy::single_match)]
#![allow(clippy::needless_borrows_for_generic_args)]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Operations Core API Server
//!
//! Boots the HTTP surface over the Scheduling Engine, Policy Engine, Payment
//! Reconciler, and Outbox & Delivery Pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use opscore_api::{routes, AppState};
use opscore_shared::db::create_migration_pool;
use opscore_shared::{create_pool, Config};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    opscore_shared::logging::init();

    let config = Arc::new(Config::from_env()?);
    info!("starting operations core api");

    run_migrations(&config.database_url).await?;

    let pool = create_pool(&config.database_url).await?;
    let state = AppState::new(pool, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = routes::create_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    let migration_pool = create_migration_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&migration_pool).await?;
    info!("migrations applied");
    Ok(())
}
