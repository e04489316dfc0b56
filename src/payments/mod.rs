//! Payment gateway seam.
//!
//! Services only talk to Stripe through [`PaymentGateway`], so tests can swap
//! the HTTP client for a mock.

pub mod refunds;
pub mod stripe;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

pub use self::refunds::StripeRefunds;
pub use self::stripe::{
    BillingDetails, Charge, Dispute, Event, PaymentIntent, Refund, RefundParams, Review,
    StripeAddress, StripeClient,
};

/// Error raised by the gateway, carrying Stripe's own code and message when
/// the API returned one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayError {
    pub code: Option<String>,
    pub message: String,
    #[serde(skip)]
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Remote operations the ledger needs from the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetches an event by id. Webhook bodies are never trusted directly.
    async fn retrieve_event(&self, event_id: &str) -> Result<Event, GatewayError>;

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn create_refund(&self, params: RefundParams) -> Result<Refund, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_gateway_code() {
        let err = GatewayError::new("Charge ch_1 has already been refunded.")
            .with_code("charge_already_refunded")
            .with_status(400);
        assert_eq!(
            err.to_string(),
            "Charge ch_1 has already been refunded. (charge_already_refunded)"
        );
        assert_eq!(err.status, Some(400));
        assert_eq!(GatewayError::new("timeout").to_string(), "timeout");
    }
}
