//! Order ledger for a digital-download store.
//!
//! Builds order aggregates from checkout data, issues refunds and credits as
//! linked refund orders, and reconciles Stripe webhook events.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod payments;
pub mod repositories;
pub mod services;
pub mod webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::OrderEventSink;
use crate::payments::{PaymentGateway, StripeRefunds};
use crate::services::{OrderBuilder, OrderService, RefundService, StatusNotifier};
use crate::webhooks::StripeWebhookReconciler;

/// Services wired against one database and gateway, shared by the HTTP
/// surface and embedding applications.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub orders: OrderService,
    pub builder: OrderBuilder,
    pub refunds: RefundService,
    pub stripe_refunds: StripeRefunds,
    pub reconciler: StripeWebhookReconciler,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        sink: Arc<dyn OrderEventSink>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let store = config.store.clone();
        let decimals = store.decimals();
        let notifier = StatusNotifier::new(sink, store.refund_window_days);

        let orders = OrderService::new(db.clone(), notifier.clone(), decimals);
        let builder = OrderBuilder::new(db.clone(), store.clone(), notifier.clone());
        let refunds = RefundService::new(db.clone(), store, notifier.clone());
        let stripe_refunds = StripeRefunds::new(db.clone(), gateway.clone(), decimals);
        let reconciler =
            StripeWebhookReconciler::new(db.clone(), gateway, refunds.clone(), notifier, decimals);

        Self {
            db,
            config,
            orders,
            builder,
            refunds,
            stripe_refunds,
            reconciler,
        }
    }
}
