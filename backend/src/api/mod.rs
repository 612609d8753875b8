pub mod webhooks;

use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use shared::WebhookResponse;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, MainConfig};
use crate::external_services::notifier::{HttpNotifier, LogNotifier};
use crate::external_services::shopify::{DryRunCanceller, ShopifyClient};
use crate::external_services::{AdminNotifier, OrderCanceller, SignatureVerifier};
use crate::order_validator::OrderValidator;
use webhooks::{order_webhook, MAX_BODY_BYTES};

pub struct AppState {
    pub verifier: SignatureVerifier,
    pub validator: OrderValidator,
    pub canceller: Arc<dyn OrderCanceller>,
    pub notifier: Arc<dyn AdminNotifier>,
}

impl AppState {
    pub fn from_config(config: &MainConfig) -> anyhow::Result<Self> {
        let canceller: Arc<dyn OrderCanceller> = if config.dry_run {
            tracing::warn!("Dry run enabled, orders will not be cancelled");
            Arc::new(DryRunCanceller)
        } else {
            let store_domain = config
                .store_domain
                .as_deref()
                .ok_or(ConfigError::MissingShopifySetting("SHOPIFY_STORE_DOMAIN"))?;
            let access_token = config
                .access_token
                .as_deref()
                .ok_or(ConfigError::MissingShopifySetting("SHOPIFY_ACCESS_TOKEN"))?;

            Arc::new(ShopifyClient::new(
                store_domain,
                access_token,
                &config.api_version,
                &config.cancel_currency,
                config.http_timeout(),
            )?)
        };

        let notifier: Arc<dyn AdminNotifier> = match (&config.notify_url, &config.admin_email) {
            (Some(url), Some(recipient)) => Arc::new(HttpNotifier::new(
                url,
                config.notify_token.as_deref(),
                recipient,
                config.http_timeout(),
            )?),
            _ => Arc::new(LogNotifier::new(config.admin_email.clone())),
        };

        Ok(Self {
            verifier: SignatureVerifier::from_config(config),
            validator: OrderValidator::new(&config.product_name, config.photo_counting),
            canceller,
            notifier,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route(
            "/webhooks/orders/create",
            any(order_webhook).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .route("/health", get(health))
        .with_state(state);

    with_layers(routes)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    tracing::error!(detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(WebhookResponse::error("Internal error")),
    )
        .into_response()
}
