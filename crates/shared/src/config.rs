//! Typed configuration loaded once at process startup from the environment.
//!
//! No dynamic settings singleton: `Config::from_env()` runs once in `main`, the
//! result is wrapped in `Arc<Config>` and handed to every service that needs it.
//! Hot-reloadable knobs (none currently) would be modeled as a narrow `RwLock<T>`
//! field on top of this, not as a process-wide mutable global.

use std::env;
use std::time::Duration;

use crate::error::SharedError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub default_org_id: Option<uuid::Uuid>,

    pub business_timezone_offset_hours: i8,

    pub deposits_enabled: bool,
    pub deposit_percent: f64,
    pub deposit_currency: String,

    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_success_url: Option<String>,
    pub stripe_cancel_url: Option<String>,
    pub stripe_invoice_success_url: Option<String>,
    pub stripe_invoice_cancel_url: Option<String>,
    pub webhook_timestamp_tolerance_seconds: i64,
    pub stuck_processing_timeout_minutes: i64,

    pub public_base_url: Option<String>,
    pub client_portal_base_url: Option<String>,

    pub email_mode: EmailMode,
    pub email_retry_backoff_seconds: u64,
    pub email_max_retries: u32,
    pub email_unsubscribe_secret: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,

    pub export_mode: ExportMode,
    pub photo_url_ttl_seconds: u64,
    pub metrics_enabled: bool,

    pub outbox_poll_interval_seconds: u64,
    pub outbox_batch_size: i64,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_seconds: u64,
    pub circuit_breaker_half_open_probes: u32,

    pub idempotency_key_ttl_seconds: u64,

    pub rate_limit_default_capacity: u32,
    pub rate_limit_default_refill_per_second: f64,

    pub time_overrun_reason_threshold_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailMode {
    Off,
    Log,
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Off,
    Log,
    Send,
}

impl Config {
    /// Loads `.env` (if present) then reads every recognized knob from the process
    /// environment. Missing optional knobs fall back to the documented defaults;
    /// missing required knobs (`DATABASE_URL`) are a hard startup error.
    pub fn from_env() -> Result<Self, SharedError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            default_org_id: optional_parsed_env("DEFAULT_ORG_ID")?,

            business_timezone_offset_hours: env_or("BUSINESS_TIMEZONE_OFFSET_HOURS", 0)?,

            deposits_enabled: env_or("DEPOSITS_ENABLED", true)?,
            deposit_percent: env_or("DEPOSIT_PERCENT", 0.25)?,
            deposit_currency: env::var("DEPOSIT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),

            stripe_secret_key: optional_env("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: optional_env("STRIPE_WEBHOOK_SECRET"),
            stripe_success_url: optional_env("STRIPE_SUCCESS_URL"),
            stripe_cancel_url: optional_env("STRIPE_CANCEL_URL"),
            stripe_invoice_success_url: optional_env("STRIPE_INVOICE_SUCCESS_URL"),
            stripe_invoice_cancel_url: optional_env("STRIPE_INVOICE_CANCEL_URL"),
            webhook_timestamp_tolerance_seconds: env_or(
                "WEBHOOK_TIMESTAMP_TOLERANCE_SECONDS",
                300,
            )?,
            stuck_processing_timeout_minutes: env_or("STUCK_PROCESSING_TIMEOUT_MINUTES", 30)?,

            public_base_url: optional_env("PUBLIC_BASE_URL"),
            client_portal_base_url: optional_env("CLIENT_PORTAL_BASE_URL"),

            email_mode: parse_email_mode(&env::var("EMAIL_MODE").unwrap_or_else(|_| "log".into())),
            email_retry_backoff_seconds: env_or("EMAIL_RETRY_BACKOFF_SECONDS", 60)?,
            email_max_retries: env_or("EMAIL_MAX_RETRIES", 3)?,
            email_unsubscribe_secret: optional_env("EMAIL_UNSUBSCRIBE_SECRET"),
            smtp_host: optional_env("SMTP_HOST"),
            smtp_port: env_or("SMTP_PORT", 587)?,
            smtp_username: optional_env("SMTP_USERNAME"),
            smtp_password: optional_env("SMTP_PASSWORD"),
            smtp_from: optional_env("SMTP_FROM"),

            export_mode: parse_export_mode(&env::var("EXPORT_MODE").unwrap_or_else(|_| "log".into())),
            photo_url_ttl_seconds: env_or("PHOTO_URL_TTL_SECONDS", 3600)?,
            metrics_enabled: env_or("METRICS_ENABLED", false)?,

            outbox_poll_interval_seconds: env_or("OUTBOX_POLL_INTERVAL_SECONDS", 30)?,
            outbox_batch_size: env_or("OUTBOX_BATCH_SIZE", 50)?,

            circuit_breaker_failure_threshold: env_or("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
            circuit_breaker_reset_seconds: env_or("CIRCUIT_BREAKER_RESET_SECONDS", 30)?,
            circuit_breaker_half_open_probes: env_or("CIRCUIT_BREAKER_HALF_OPEN_PROBES", 2)?,

            idempotency_key_ttl_seconds: env_or("IDEMPOTENCY_KEY_TTL_SECONDS", 86_400)?,

            rate_limit_default_capacity: env_or("RATE_LIMIT_DEFAULT_CAPACITY", 20)?,
            rate_limit_default_refill_per_second: env_or(
                "RATE_LIMIT_DEFAULT_REFILL_PER_SECOND",
                0.5,
            )?,

            time_overrun_reason_threshold_minutes: env_or(
                "TIME_OVERRUN_REASON_THRESHOLD_MINUTES",
                15,
            )?,
        })
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    pub fn signature_verify_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    pub fn stripe_configured(&self) -> bool {
        self.stripe_secret_key.is_some()
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some()
    }
}

fn require_env(key: &str) -> Result<String, SharedError> {
    env::var(key).map_err(|_| SharedError::MissingEnv(key.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn optional_parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, SharedError> {
    match optional_env(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| SharedError::InvalidEnv {
                name: key.to_string(),
                detail: format!("could not parse '{raw}'"),
            }),
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, SharedError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|_| SharedError::InvalidEnv {
            name: key.to_string(),
            detail: format!("could not parse '{raw}'"),
        }),
    }
}

fn parse_email_mode(raw: &str) -> EmailMode {
    match raw {
        "off" => EmailMode::Off,
        "send" => EmailMode::Send,
        _ => EmailMode::Log,
    }
}

fn parse_export_mode(raw: &str) -> ExportMode {
    match raw {
        "off" => ExportMode::Off,
        "send" => ExportMode::Send,
        _ => ExportMode::Log,
    }
}
