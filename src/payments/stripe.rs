use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GatewayError, PaymentGateway};
use crate::config::StripeSettings;

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Allowed clock skew for signatures stamped in the future.
const FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// Decodes the embedded object as the type the event kind implies.
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripeAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundList {
    #[serde(default)]
    pub data: Vec<Refund>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Minor units
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    #[serde(default)]
    pub captured: bool,
    /// True only once the whole amount is refunded
    #[serde(default)]
    pub refunded: bool,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub billing_details: BillingDetails,
    #[serde(default)]
    pub refunds: RefundList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub charge: Option<String>,
    pub currency: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub charge: Option<String>,
    pub payment_intent: Option<String>,
    pub reason: Option<String>,
    pub opened_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: String,
    pub charge: Option<String>,
    pub payment_intent: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: Option<String>,
    pub latest_charge: Option<String>,
}

/// Body of `POST /v1/refunds`. Exactly one of `charge` or `payment_intent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundParams {
    pub charge: Option<String>,
    pub payment_intent: Option<String>,
    /// Minor units; `None` refunds whatever remains on the charge
    pub amount: Option<i64>,
    pub metadata: Vec<(String, String)>,
}

impl RefundParams {
    fn form(&self) -> Vec<(String, String)> {
        let mut form = Vec::new();
        if let Some(charge) = &self.charge {
            form.push(("charge".to_string(), charge.clone()));
        }
        if let Some(intent) = &self.payment_intent {
            form.push(("payment_intent".to_string(), intent.clone()));
        }
        if let Some(amount) = self.amount {
            form.push(("amount".to_string(), amount.to_string()));
        }
        for (key, value) in &self.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        form
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: GatewayError,
}

/// Thin Stripe REST client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Result<Self, GatewayError> {
        let secret_key = settings
            .secret_key
            .clone()
            .ok_or_else(|| GatewayError::new("Stripe secret key is not configured"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::new(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        debug!(path, "Stripe GET");
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| GatewayError::new(format!("Stripe API error: {}", e)))?;
        Self::decode(response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        debug!(path, "Stripe POST");
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::new(format!("Stripe API error: {}", e)))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|envelope| envelope.error)
                .unwrap_or_else(|_| GatewayError::new(format!("Stripe API error: {}", body)));
            warn!(status = status.as_u16(), code = ?err.code, "Stripe request failed");
            return Err(err.with_status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::new(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn retrieve_event(&self, event_id: &str) -> Result<Event, GatewayError> {
        self.get(&format!("events/{}", event_id)).await
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        self.get(&format!("charges/{}", charge_id)).await
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        self.get(&format!("payment_intents/{}", payment_intent_id))
            .await
    }

    async fn create_refund(&self, params: RefundParams) -> Result<Refund, GatewayError> {
        self.post_form("refunds", &params.form()).await
    }
}

/// Checks a `Stripe-Signature` header (`t=<ts>,v1=<hex>`) against the raw body.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> bool {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(sig) = part.trim().strip_prefix("v1=") {
            signatures.push(sig);
        }
    }

    let Some(timestamp_str) = timestamp else {
        return false;
    };
    let Ok(timestamp) = timestamp_str.parse::<i64>() else {
        return false;
    };

    let age = now - timestamp;
    if age > tolerance_secs {
        warn!(age, max = tolerance_secs, "Stripe webhook rejected: timestamp too old");
        return false;
    }
    if age < -FUTURE_SKEW_SECS {
        warn!(age, "Stripe webhook rejected: timestamp in the future");
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);

    signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    })
}

/// Builds a header value the way Stripe does; used by tests and local tooling.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={}", timestamp),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
