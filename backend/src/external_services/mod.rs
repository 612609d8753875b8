pub mod notifier;
pub mod shopify;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use shared::OrderId;
use thiserror::Error;

use crate::config::MainConfig;
use crate::external_services::notifier::AdminNotice;

type HmacSha256 = Hmac<Sha256>;

/// Checks the `x-shopify-hmac-sha256` header against the raw request body.
#[derive(Clone)]
pub enum SignatureVerifier {
    Hmac { secret: Vec<u8> },
    /// Accepts everything. Only built when insecure mode is explicitly enabled.
    Disabled,
}

impl SignatureVerifier {
    pub fn from_config(config: &MainConfig) -> Self {
        match &config.webhook_secret {
            Some(secret) => SignatureVerifier::Hmac {
                secret: secret.as_bytes().to_vec(),
            },
            None => {
                tracing::warn!("No webhook secret configured, signatures will not be verified");
                SignatureVerifier::Disabled
            }
        }
    }

    pub fn verify(&self, body: &[u8], provided_signature: Option<&str>) -> bool {
        match self {
            SignatureVerifier::Disabled => {
                tracing::warn!("Webhook accepted without signature verification");
                true
            }
            SignatureVerifier::Hmac { secret } => {
                let Some(provided_signature) = provided_signature else {
                    return false;
                };

                let Ok(decoded) = BASE64.decode(provided_signature.trim()) else {
                    return false;
                };

                // verify_slice compares in constant time
                hmac_for(secret, body).verify_slice(&decoded).is_ok()
            }
        }
    }
}

fn hmac_for(secret: &[u8], body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// `base64(HMAC_SHA256(secret, body))`, the value Shopify puts in the signature header.
#[cfg(test)]
pub(crate) fn sign(secret: &[u8], body: &[u8]) -> String {
    BASE64.encode(hmac_for(secret, body).finalize().into_bytes())
}

#[async_trait]
pub trait OrderCanceller: Send + Sync {
    async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<(), CancelError>;
}

#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify(&self, notice: &AdminNotice) -> Result<(), NotifyError>;
}

#[derive(Error, Debug)]
pub enum CancelError {
    #[error("Can't connect to Shopify: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Shopify refused cancellation with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Can't connect to notification service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification service answered with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}
