use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use shared::OrderId;

use crate::external_services::{CancelError, OrderCanceller};

#[derive(Serialize, Debug)]
/**
https://shopify.dev/docs/api/admin-rest/2023-10/resources/order#post-orders-order-id-cancel
 */
struct CancelOrderParams<'a> {
    /**
    Amount to refund. Zero leaves the refund computation to `refund`.
     */
    amount: u32,

    /**
    Currency of the refund amount
     */
    currency: &'a str,

    /**
    Why the order was cancelled
     */
    reason: CancelReason,

    /**
    Send the cancellation email to the customer
     */
    email: bool,

    /**
    Refund the payment when cancelling
     */
    refund: bool,
}

#[derive(Serialize, Debug, Clone, Copy)]
enum CancelReason {
    #[serde(rename = "fraud")]
    Fraud,
}

/// Admin API client, cancels orders on the store.
pub struct ShopifyClient {
    client: Client,
    base_url: String,
    access_token: String,
    api_version: String,
    currency: String,
}

impl ShopifyClient {
    pub fn new(
        store_domain: &str,
        access_token: &str,
        api_version: &str,
        currency: &str,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Self::with_base_url(
            format!("https://{store_domain}"),
            access_token,
            api_version,
            currency,
            timeout,
        )
    }

    fn with_base_url(
        base_url: String,
        access_token: &str,
        api_version: &str,
        currency: &str,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            access_token: access_token.to_string(),
            api_version: api_version.to_string(),
            currency: currency.to_string(),
        })
    }

    fn cancel_order_request(&self, order_id: &OrderId) -> RequestBuilder {
        let params = CancelOrderParams {
            amount: 0,
            currency: &self.currency,
            reason: CancelReason::Fraud,
            email: true,
            refund: true,
        };

        self.client
            .post(format!(
                "{}/admin/api/{}/orders/{}/cancel.json",
                self.base_url, self.api_version, order_id
            ))
            .header("X-Shopify-Access-Token", &self.access_token)
            .header("Accept", "application/json")
            .json(&params)
    }
}

#[async_trait]
impl OrderCanceller for ShopifyClient {
    async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<(), CancelError> {
        let response = self.cancel_order_request(order_id).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CancelError::Rejected { status, body });
        }

        tracing::info!(%order_id, reason, "Order cancelled on Shopify");

        Ok(())
    }
}

/// Cancels nothing, only logs what would have been cancelled.
#[derive(Debug, Default)]
pub struct DryRunCanceller;

#[async_trait]
impl OrderCanceller for DryRunCanceller {
    async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<(), CancelError> {
        tracing::info!(%order_id, reason, "Dry run, order would have been cancelled");

        Ok(())
    }
}
