//! Thin wrapper around `stripe::Client` carrying the config every payment
//! operation needs (secret key already baked into the client, webhook secret
//! for signature verification, the base URL used to build checkout
//! success/cancel redirects). Grounded on the `StripeClient`/`StripeConfig`
//! pair referenced throughout `subscriptions.rs` and `refund.rs`.

use opscore_shared::config::Config;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub app_base_url: String,
}

impl StripeConfig {
    pub fn from_app_config(config: &Config) -> Option<Self> {
        Some(Self {
            secret_key: config.stripe_secret_key.clone()?,
            webhook_secret: config.stripe_webhook_secret.clone()?,
            app_base_url: config.public_base_url.clone().unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct StripeClient {
    #[cfg(feature = "stripe")]
    inner: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        #[cfg(feature = "stripe")]
        let inner = stripe::Client::new(config.secret_key.clone());
        Self {
            #[cfg(feature = "stripe")]
            inner,
            config,
        }
    }

    #[cfg(feature = "stripe")]
    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
