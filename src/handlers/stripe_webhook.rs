use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::ErrorResponse;
use crate::payments::stripe::verify_webhook_signature;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Only the id is read from the body; the event itself is fetched from Stripe.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}

/// POST /webhooks/stripe
///
/// Any failure answers 500 so Stripe retries the delivery.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.config.stripe.webhook_secret.as_deref() {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        let verified = verify_webhook_signature(
            &body,
            header,
            secret,
            state.config.stripe.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        );
        if !verified {
            warn!("Stripe webhook signature verification failed");
            counter!("edd_orders.webhooks.rejected", 1);
            return failure(StatusCode::UNAUTHORIZED, "invalid_signature", "invalid webhook signature");
        }
    }

    let event_id = match serde_json::from_slice::<WebhookEnvelope>(&body) {
        Ok(envelope) if !envelope.id.trim().is_empty() => envelope.id,
        Ok(_) => {
            error!("Stripe webhook body has no event id");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "invalid_payload", "missing event id");
        }
        Err(e) => {
            error!(error = %e, "Stripe webhook body is not JSON");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "invalid_payload", "unparseable body");
        }
    };

    match state.reconciler.process_event_id(&event_id).await {
        Ok(()) => {
            info!(event_id = %event_id, "Stripe webhook processed");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(e) => {
            error!(event_id = %event_id, error = %e, "Stripe webhook processing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.code(), &e.response_message())
        }
    }
}

fn failure(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        code: code.to_string(),
        message: message.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (status, Json(body)).into_response()
}
