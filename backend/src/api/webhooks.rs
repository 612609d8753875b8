use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{FromRequest, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::{Order, WebhookResponse};
use thiserror::Error;

use crate::api::AppState;
use crate::external_services::notifier::AdminNotice;

pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";

/// Largest order payload buffered for signature checking.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Can't read request body: {0}")]
    Body(#[from] BytesRejection),

    #[error("Can't parse order payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::MethodNotAllowed(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "POST")],
                Json(WebhookResponse::error("Method not allowed")),
            )
                .into_response(),

            WebhookError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::error("Invalid signature")),
            )
                .into_response(),

            WebhookError::Body(_) | WebhookError::Payload(_) => {
                tracing::error!(error = %self, "Webhook processing failed");

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(WebhookResponse::error("Internal error")),
                )
                    .into_response()
            }
        }
    }
}

/// `orders/create` webhook. Cancels orders whose uploaded photos don't match
/// the ordered quantity.
pub async fn order_webhook(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    request: Request<Body>,
) -> Result<Json<WebhookResponse>, WebhookError> {
    if method != Method::POST {
        return Err(WebhookError::MethodNotAllowed(method));
    }

    // Buffered only after the method check so the body limit can't mask a 405.
    let body = Bytes::from_request(request, &state).await?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if !state.verifier.verify(&body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(WebhookError::InvalidSignature);
    }

    let order: Order = serde_json::from_slice(&body)?;

    tracing::info!(
        order_id = %order.id,
        order_number = order.display_number(),
        line_items = order.line_items.len(),
        "Order received"
    );

    let result = state.validator.validate(&order);

    let Some(reason) = result.reason() else {
        tracing::info!(order_id = %order.id, "Order valid");
        return Ok(Json(WebhookResponse::message("Order valid")));
    };

    tracing::warn!(
        order_id = %order.id,
        invalid_items = ?result.invalid_items,
        "Invalid order detected"
    );

    if let Err(err) = state.canceller.cancel(&order.id, &reason).await {
        tracing::error!(order_id = %order.id, error = %err, "Failed to cancel order");
    }

    if let Err(err) = state
        .notifier
        .notify(&AdminNotice::new(&order, &reason))
        .await
    {
        tracing::error!(order_id = %order.id, error = %err, "Failed to notify admin");
    }

    Ok(Json(
        WebhookResponse::message("Order cancelled").with_reason(reason),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use serde_json::{json, Value};
    use shared::OrderId;
    use tower::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::api::tests::body_json;
    use crate::external_services::{
        sign, AdminNotifier, CancelError, NotifyError, OrderCanceller, SignatureVerifier,
    };
    use crate::order_validator::{OrderValidator, PhotoCounting};

    const SECRET: &[u8] = b"hush";
    const PATH: &str = "/webhooks/orders/create";

    /// Records cancel calls, optionally failing like an unreachable shop.
    #[derive(Default)]
    struct RecordingCanceller {
        calls: Mutex<Vec<(OrderId, String)>>,
        fail: bool,
    }

    impl RecordingCanceller {
        fn cancelled(&self) -> Vec<(OrderId, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderCanceller for RecordingCanceller {
        async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<(), CancelError> {
            self.calls
                .lock()
                .unwrap()
                .push((order_id.clone(), reason.to_string()));
            if self.fail {
                return Err(CancelError::Rejected {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: "shop down".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<AdminNotice>>,
        fail: bool,
    }

    #[async_trait]
    impl AdminNotifier for RecordingNotifier {
        async fn notify(&self, notice: &AdminNotice) -> Result<(), NotifyError> {
            self.notices.lock().unwrap().push(notice.clone());
            if self.fail {
                return Err(NotifyError::Rejected {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        canceller: Arc<RecordingCanceller>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(verifier: SignatureVerifier) -> Harness {
        let canceller = Arc::new(RecordingCanceller::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState {
            verifier,
            validator: OrderValidator::new("tirage", PhotoCounting::Deduplicated),
            canceller: canceller.clone(),
            notifier: notifier.clone(),
        };

        Harness {
            app: router(Arc::new(state)),
            canceller,
            notifier,
        }
    }

    fn signed() -> Harness {
        harness(SignatureVerifier::Hmac {
            secret: SECRET.to_vec(),
        })
    }

    fn order_body(quantity: u32, photo_count: usize) -> String {
        let properties: Vec<Value> = (1..=photo_count)
            .map(|i| {
                json!({
                    "name": format!("Photo {i}"),
                    "value": format!("https://cdn.uploadkit.io/files/{i}.jpg")
                })
            })
            .collect();

        json!({
            "id": 820982911946154500u64,
            "order_number": 1001,
            "total_price": "24.90",
            "currency": "EUR",
            "line_items": [
                { "title": "Tirage 10x15", "quantity": quantity, "properties": properties },
                { "title": "Cadre bois", "quantity": 1, "properties": [] }
            ]
        })
        .to_string()
    }

    fn signed_post(body: &str) -> Request<Body> {
        Request::post(PATH)
            .header(SIGNATURE_HEADER, sign(SECRET, body.as_bytes()))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_non_post_methods_are_rejected() {
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let h = signed();
            let body = order_body(3, 2);

            let request = Request::builder()
                .method(method.clone())
                .uri(PATH)
                .header(SIGNATURE_HEADER, sign(SECRET, body.as_bytes()))
                .body(Body::from(body))
                .unwrap();

            let response = h.app.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(response.headers()[header::ALLOW], "POST");
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Method not allowed" })
            );
            assert!(h.canceller.cancelled().is_empty());
        }
    }

    #[tokio::test]
    async fn test_valid_order() {
        let h = signed();

        let response = h.app.oneshot(signed_post(&order_body(3, 3))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "Order valid" }));
        assert!(h.canceller.cancelled().is_empty());
        assert!(h.notifier.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_order_is_cancelled_once() {
        let h = signed();

        let response = h.app.oneshot(signed_post(&order_body(3, 2))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let reason = "Quantity mismatch: \"Tirage 10x15\": photos=2, ordered=3";
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Order cancelled", "reason": reason })
        );
        assert_eq!(
            h.canceller.cancelled(),
            vec![(OrderId("820982911946154500".into()), reason.to_string())]
        );

        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].order_number, "1001");
        assert_eq!(notices[0].reason, reason);
    }

    #[tokio::test]
    async fn test_cancel_failure_keeps_success_status() {
        let canceller = Arc::new(RecordingCanceller {
            fail: true,
            ..Default::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState {
            verifier: SignatureVerifier::Hmac {
                secret: SECRET.to_vec(),
            },
            validator: OrderValidator::new("tirage", PhotoCounting::Deduplicated),
            canceller: canceller.clone(),
            notifier: notifier.clone(),
        };

        let response = router(Arc::new(state))
            .oneshot(signed_post(&order_body(2, 5)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Order cancelled");
        assert_eq!(canceller.cancelled().len(), 1);
        assert_eq!(notifier.notices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_success_status() {
        let canceller = Arc::new(RecordingCanceller::default());
        let state = AppState {
            verifier: SignatureVerifier::Disabled,
            validator: OrderValidator::new("tirage", PhotoCounting::Deduplicated),
            canceller: canceller.clone(),
            notifier: Arc::new(RecordingNotifier {
                fail: true,
                ..Default::default()
            }),
        };

        let response = router(Arc::new(state))
            .oneshot(signed_post(&order_body(1, 0)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(canceller.cancelled().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized() {
        let h = signed();
        let body = order_body(3, 2);

        let request = Request::post(PATH)
            .header(SIGNATURE_HEADER, sign(b"someone else", body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Invalid signature" })
        );
        assert!(h.canceller.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let h = signed();

        let request = Request::post(PATH)
            .body(Body::from(order_body(3, 2)))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_insecure_mode_accepts_unsigned_webhooks() {
        let h = harness(SignatureVerifier::Disabled);

        let request = Request::post(PATH)
            .body(Body::from(order_body(2, 2)))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "Order valid" }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_internal_error() {
        let h = signed();

        let response = h.app.oneshot(signed_post("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal error" })
        );
        assert!(h.canceller.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_payload_shape_is_internal_error() {
        let h = signed();

        let response = h
            .app
            .oneshot(signed_post(r#"{"id": 1, "line_items": "nope"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal error" })
        );
    }

    #[tokio::test]
    async fn test_oversized_body_still_gets_method_not_allowed() {
        let h = signed();

        let request = Request::get(PATH)
            .body(Body::from(vec![b'x'; 3 * MAX_BODY_BYTES]))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }

    #[tokio::test]
    async fn test_oversized_post_is_internal_error() {
        let h = signed();
        let body = vec![b' '; MAX_BODY_BYTES + 1];

        let request = Request::post(PATH)
            .header(SIGNATURE_HEADER, sign(SECRET, &body))
            .body(Body::from(body))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal error" })
        );
        assert!(h.canceller.cancelled().is_empty());
    }
}
