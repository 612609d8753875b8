use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::{Order, OrderId};

use crate::external_services::{AdminNotifier, NotifyError};

/// What the administrator is told about a cancelled order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNotice {
    pub order_id: OrderId,
    pub order_number: String,
    pub total_price: Option<String>,
    pub currency: Option<String>,
    pub reason: String,
}

impl AdminNotice {
    pub fn new(order: &Order, reason: &str) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.display_number().to_string(),
            total_price: order.total_price.clone(),
            currency: order.currency.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Fraudulent order detected - {}", self.order_number)
    }

    pub fn text(&self) -> String {
        let amount = match (&self.total_price, &self.currency) {
            (Some(price), Some(currency)) => format!("{price} {currency}"),
            (Some(price), None) => price.clone(),
            (None, _) => "unknown".to_string(),
        };

        format!(
            "Order cancelled automatically.\nReason: {}\nAmount: {amount}",
            self.reason
        )
    }
}

/// Writes notices to the log. Used when no notification service is configured.
#[derive(Debug, Default)]
pub struct LogNotifier {
    recipient: Option<String>,
}

impl LogNotifier {
    pub fn new(recipient: Option<String>) -> Self {
        Self { recipient }
    }
}

#[async_trait]
impl AdminNotifier for LogNotifier {
    async fn notify(&self, notice: &AdminNotice) -> Result<(), NotifyError> {
        tracing::warn!(
            recipient = self.recipient.as_deref().unwrap_or("-"),
            order_id = %notice.order_id,
            subject = %notice.subject(),
            reason = %notice.reason,
            "Admin notification"
        );

        Ok(())
    }
}

#[derive(Serialize, Debug)]
struct SendEmailParams<'a> {
    to: &'a str,
    subject: String,
    text: String,
}

/// Posts notices to an email relay (`{ to, subject, text }` as JSON).
pub struct HttpNotifier {
    client: Client,
    url: String,
    token: Option<String>,
    recipient: String,
}

impl HttpNotifier {
    pub fn new(
        url: &str,
        token: Option<&str>,
        recipient: &str,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            token: token.map(str::to_string),
            recipient: recipient.to_string(),
        })
    }
}

#[async_trait]
impl AdminNotifier for HttpNotifier {
    async fn notify(&self, notice: &AdminNotice) -> Result<(), NotifyError> {
        let params = SendEmailParams {
            to: &self.recipient,
            subject: notice.subject(),
            text: notice.text(),
        };

        let mut request = self.client.post(&self.url).json(&params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        tracing::info!(order_id = %notice.order_id, "Admin notified");

        Ok(())
    }
}
