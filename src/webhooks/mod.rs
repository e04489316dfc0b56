//! Inbound gateway notifications.

pub mod stripe;

pub use stripe::StripeWebhookReconciler;
