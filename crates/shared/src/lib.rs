#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared primitives for the Operations Core workspace.
//!
//! Every other crate (`opscore-core`, `opscore-api`, `opscore-worker`) depends on this
//! one for the things that have no business living in a single domain module: the
//! clock abstraction, env-driven configuration, the org-scoping/locking helpers, the
//! common error kind taxonomy, and the DB pool constructor.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod tenancy;

pub use clock::Clock;
pub use config::Config;
pub use db::create_pool;
pub use error::{ErrorKind, SharedError};
pub use rate_limit::{RateLimitOutcome, RateLimiter};
pub use tenancy::{Identity, OrgId, Role};
