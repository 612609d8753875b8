use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::order_validator::PhotoCounting;

#[derive(Deserialize, Clone)]
pub struct MainConfig {
    #[serde(rename = "shopify_webhook_secret", default)]
    pub webhook_secret: Option<String>,
    #[serde(rename = "shopify_access_token", default)]
    pub access_token: Option<String>,
    #[serde(rename = "shopify_store_domain", default)]
    pub store_domain: Option<String>,
    #[serde(rename = "shopify_api_version", default = "default_api_version")]
    pub api_version: String,

    #[serde(rename = "order_validator_product_name", default = "default_product_name")]
    pub product_name: String,
    #[serde(rename = "order_validator_photo_counting", default)]
    pub photo_counting: PhotoCounting,
    #[serde(rename = "order_validator_cancel_currency", default = "default_currency")]
    pub cancel_currency: String,
    #[serde(rename = "order_validator_dry_run", default)]
    pub dry_run: bool,
    #[serde(rename = "order_validator_insecure_skip_verification", default)]
    pub insecure_skip_verification: bool,

    #[serde(rename = "order_validator_admin_email", default)]
    pub admin_email: Option<String>,
    #[serde(rename = "order_validator_notify_url", default)]
    pub notify_url: Option<String>,
    #[serde(rename = "order_validator_notify_token", default)]
    pub notify_token: Option<String>,

    #[serde(rename = "order_validator_http_timeout_secs", default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(rename = "order_validator_listen_addr", default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_api_version() -> String {
    "2023-10".to_string()
}

fn default_product_name() -> String {
    "tirage".to_string()
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Can't read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("SHOPIFY_WEBHOOK_SECRET is not set (set ORDER_VALIDATOR_INSECURE_SKIP_VERIFICATION=true to accept unsigned webhooks)")]
    MissingWebhookSecret,

    #[error("{0} is required unless ORDER_VALIDATOR_DRY_RUN=true")]
    MissingShopifySetting(&'static str),

    #[error("ORDER_VALIDATOR_NOTIFY_URL is set but ORDER_VALIDATOR_ADMIN_EMAIL is not")]
    MissingAdminEmail,

    #[error("ORDER_VALIDATOR_PRODUCT_NAME must not be empty")]
    EmptyProductName,

    #[error("ORDER_VALIDATOR_HTTP_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,
}

impl MainConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_iter(std::env::vars())
    }

    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = envy::from_iter::<_, MainConfig>(vars)?;

        for value in [
            &mut config.webhook_secret,
            &mut config.access_token,
            &mut config.store_domain,
            &mut config.admin_email,
            &mut config.notify_url,
            &mut config.notify_token,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_secret.is_none() && !self.insecure_skip_verification {
            return Err(ConfigError::MissingWebhookSecret);
        }

        if !self.dry_run {
            if self.access_token.is_none() {
                return Err(ConfigError::MissingShopifySetting("SHOPIFY_ACCESS_TOKEN"));
            }
            if self.store_domain.is_none() {
                return Err(ConfigError::MissingShopifySetting("SHOPIFY_STORE_DOMAIN"));
            }
        }

        if self.notify_url.is_some() && self.admin_email.is_none() {
            return Err(ConfigError::MissingAdminEmail);
        }

        if self.product_name.trim().is_empty() {
            return Err(ConfigError::EmptyProductName);
        }

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Debug for MainConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");

        f.debug_struct("MainConfig")
            .field("webhook_secret", &redacted(&self.webhook_secret))
            .field("access_token", &redacted(&self.access_token))
            .field("store_domain", &self.store_domain)
            .field("api_version", &self.api_version)
            .field("product_name", &self.product_name)
            .field("photo_counting", &self.photo_counting)
            .field("cancel_currency", &self.cancel_currency)
            .field("dry_run", &self.dry_run)
            .field("insecure_skip_verification", &self.insecure_skip_verification)
            .field("admin_email", &self.admin_email)
            .field("notify_url", &self.notify_url)
            .field("notify_token", &redacted(&self.notify_token))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}
