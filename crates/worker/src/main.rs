//! Background worker: drains the outbox (email + export) under per-kind
//! circuit breakers, and runs the periodic invariant sweep.
//!
//! - The outbox sweep cadence is a plain config knob (`outbox_poll_interval_seconds`),
//!   so it runs on a `tokio::time::interval` loop rather than a cron expression.
//! - The invariant sweep has no such knob; it runs on a fixed cron schedule via
//!   `tokio_cron_scheduler`, the same scheduler style used elsewhere in this codebase
//!   for fixed-cadence jobs.

mod email_adapter;

use std::sync::Arc;
use std::time::Duration;

use opscore_core::invariants::InvariantChecker;
use opscore_core::outbox::{
    claim_batch, deliver_email_event, deliver_export_event, pending_lag_seconds, DeliveryPolicy,
    EmailAdapter, ExportAdapter, LoggingEmailAdapter, NoopEmailAdapter, NoopExportAdapter,
    OutboxKind, SweepCounters,
};
use opscore_core::payments::CircuitBreaker;
use opscore_shared::config::EmailMode;
use opscore_shared::Config;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use email_adapter::SmtpEmailAdapter;

fn build_email_adapter(config: &Config) -> Arc<dyn EmailAdapter> {
    match config.email_mode {
        EmailMode::Off => Arc::new(NoopEmailAdapter),
        EmailMode::Log => Arc::new(LoggingEmailAdapter),
        EmailMode::Send => match (&config.smtp_host, &config.smtp_from) {
            (Some(host), Some(from)) => match SmtpEmailAdapter::new(
                host,
                config.smtp_port,
                config.smtp_username.as_deref(),
                config.smtp_password.as_deref(),
                from,
            ) {
                Ok(adapter) => Arc::new(adapter),
                Err(e) => {
                    error!(error = %e, "failed to build SMTP adapter, falling back to logging");
                    Arc::new(LoggingEmailAdapter)
                }
            },
            _ => {
                warn!("email_mode=send but SMTP_HOST/SMTP_FROM not configured, falling back to logging");
                Arc::new(LoggingEmailAdapter)
            }
        },
    }
}

fn build_export_adapter(_config: &Config) -> Arc<dyn ExportAdapter> {
    // No export webhook target is part of the recognized configuration surface;
    // `export_mode=send` without one configured degrades to a no-op push,
    // matching the email side's "off" behavior rather than erroring the sweep.
    Arc::new(NoopExportAdapter)
}

async fn sweep_email(
    pool: &PgPool,
    batch_size: i64,
    adapter: &dyn EmailAdapter,
    breaker: &CircuitBreaker,
    policy: &DeliveryPolicy,
) {
    let events = match claim_batch(pool, OutboxKind::Email, batch_size).await {
        Ok(events) => events,
        Err(e) => {
            error!(kind = "email", error = %e, "failed to claim outbox batch");
            return;
        }
    };

    let mut counters = SweepCounters::default();
    for event in &events {
        match deliver_email_event(pool, event, adapter, breaker, policy).await {
            Ok(outcome) => counters.record(outcome),
            Err(e) => error!(event_id = %event.event_id, error = %e, "email delivery attempt errored"),
        }
    }

    log_sweep("email", events.len(), &counters, pending_lag_seconds(pool, OutboxKind::Email).await.ok().flatten());
}

async fn sweep_export(
    pool: &PgPool,
    batch_size: i64,
    adapter: &dyn ExportAdapter,
    breaker: &CircuitBreaker,
    policy: &DeliveryPolicy,
) {
    let events = match claim_batch(pool, OutboxKind::Export, batch_size).await {
        Ok(events) => events,
        Err(e) => {
            error!(kind = "export", error = %e, "failed to claim outbox batch");
            return;
        }
    };

    let mut counters = SweepCounters::default();
    for event in &events {
        match deliver_export_event(pool, event, adapter, breaker, policy).await {
            Ok(outcome) => counters.record(outcome),
            Err(e) => error!(event_id = %event.event_id, error = %e, "export delivery attempt errored"),
        }
    }

    log_sweep("export", events.len(), &counters, pending_lag_seconds(pool, OutboxKind::Export).await.ok().flatten());
}

fn log_sweep(kind: &'static str, claimed: usize, counters: &SweepCounters, lag_seconds: Option<i64>) {
    info!(
        kind,
        claimed,
        sent = counters.sent,
        skipped = counters.skipped,
        retrying = counters.retrying,
        dead = counters.dead,
        pending_lag_seconds = lag_seconds,
        "outbox sweep complete"
    );
}

async fn run_invariant_sweep(pool: &PgPool) {
    let checker = InvariantChecker::new(pool.clone());
    match checker.run_all_checks().await {
        Ok(summary) => {
            if summary.healthy {
                info!(
                    checks_run = summary.checks_run,
                    "invariant sweep: all checks passed"
                );
            } else {
                for violation in &summary.violations {
                    warn!(
                        invariant = violation.invariant,
                        severity = %violation.severity,
                        org_ids = ?violation.org_ids,
                        "invariant violation detected: {}",
                        violation.description
                    );
                }
                warn!(
                    checks_run = summary.checks_run,
                    checks_failed = summary.checks_failed,
                    "invariant sweep: violations found"
                );
            }
        }
        Err(e) => error!(error = %e, "invariant sweep failed to run"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    opscore_shared::logging::init();
    let config = Arc::new(Config::from_env()?);
    info!("starting operations core worker");

    let pool = opscore_shared::create_pool(&config.database_url).await?;

    let email_adapter = build_email_adapter(&config);
    let export_adapter = build_export_adapter(&config);
    let email_breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker_failure_threshold,
        Duration::from_secs(config.circuit_breaker_reset_seconds),
        config.circuit_breaker_half_open_probes,
    ));
    let export_breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker_failure_threshold,
        Duration::from_secs(config.circuit_breaker_reset_seconds),
        config.circuit_breaker_half_open_probes,
    ));
    let policy = DeliveryPolicy {
        max_retries: config.email_max_retries,
        base_backoff: Duration::from_secs(config.email_retry_backoff_seconds),
        call_timeout: config.external_call_timeout(),
    };

    let sweep_pool = pool.clone();
    let sweep_config = config.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(sweep_config.outbox_poll_interval_seconds));
        loop {
            interval.tick().await;
            sweep_email(
                &sweep_pool,
                sweep_config.outbox_batch_size,
                email_adapter.as_ref(),
                &email_breaker,
                &policy,
            )
            .await;
            sweep_export(
                &sweep_pool,
                sweep_config.outbox_batch_size,
                export_adapter.as_ref(),
                &export_breaker,
                &policy,
            )
            .await;
        }
    });
    info!(
        interval_seconds = config.outbox_poll_interval_seconds,
        "scheduled: outbox delivery sweep"
    );

    let scheduler = JobScheduler::new().await?;
    let invariant_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let pool = invariant_pool.clone();
            Box::pin(async move {
                run_invariant_sweep(&pool).await;
            })
        })?)
        .await?;
    info!("scheduled: invariant sweep (every 15 minutes)");

    scheduler.start().await?;

    // The scheduler and the sweep task both run in background tasks; keep the
    // process alive.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
