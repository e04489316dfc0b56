#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, Set};
use serde_json::Value;

use edd_orders::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{discount, product, product_price, tax_rate},
    events::{Event as LedgerEvent, OrderEventSink},
    handlers,
    models::{AddressInput, OrderStatus},
    payments::{
        stripe::EventData, Charge, Event, GatewayError, PaymentGateway, PaymentIntent, Refund,
        RefundParams,
    },
    services::{BuildOrderRequest, CartLine},
    AppState,
};

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn retrieve_event(&self, event_id: &str) -> Result<Event, GatewayError>;
        async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;
        async fn retrieve_payment_intent(
            &self,
            payment_intent_id: &str,
        ) -> Result<PaymentIntent, GatewayError>;
        async fn create_refund(&self, params: RefundParams) -> Result<Refund, GatewayError>;
    }
}

/// Sink that keeps every notification for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: LedgerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl OrderEventSink for RecordingSink {
    fn on_order_built(&self, order_id: i64) {
        self.push(LedgerEvent::OrderBuilt(order_id));
    }

    fn on_status_changed(&self, order_id: i64, old_status: &str, new_status: &str) {
        self.push(LedgerEvent::OrderStatusChanged {
            order_id,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
        });
    }

    fn on_refund_created(&self, order_id: i64, refund_id: i64) {
        self.push(LedgerEvent::RefundCreated {
            order_id,
            refund_id,
        });
    }

    fn on_gateway_event(&self, event_type: &str, event_id: &str) {
        self.push(LedgerEvent::GatewayEvent {
            event_type: event_type.to_string(),
            event_id: event_id.to_string(),
        });
    }
}

/// Application state over a fresh in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub sink: Arc<RecordingSink>,
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
    cfg.auto_migrate = true;
    // A single connection keeps every query on the same in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.store.tax_enabled = true;
    cfg.store.default_tax_rate = dec!(8);
    cfg
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(test_config(), MockGateway::new()).await
    }

    pub async fn with_gateway(gateway: MockGateway) -> Self {
        Self::build(test_config(), gateway).await
    }

    pub async fn build(cfg: AppConfig, gateway: MockGateway) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let sink = Arc::new(RecordingSink::default());
        let state = AppState::new(Arc::new(pool), cfg, sink.clone(), Arc::new(gateway));
        Self { state, sink }
    }

    pub fn db(&self) -> &DbPool {
        self.state.db.as_ref()
    }

    pub fn router(&self) -> Router {
        handlers::router(self.state.clone())
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            status: Set("publish".to_string()),
            price: Set(price),
            variable_pricing: Set(false),
            sales: Set(0),
            earnings: Set(Decimal::ZERO),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_variable_product(
        &self,
        name: &str,
        options: &[(i64, &str, Decimal)],
    ) -> product::Model {
        let product = product::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            status: Set("publish".to_string()),
            price: Set(Decimal::ZERO),
            variable_pricing: Set(true),
            sales: Set(0),
            earnings: Set(Decimal::ZERO),
        }
        .insert(self.db())
        .await
        .expect("seed variable product");

        for (index, option, amount) in options {
            product_price::ActiveModel {
                id: NotSet,
                product_id: Set(product.id),
                price_index: Set(*index),
                name: Set(option.to_string()),
                amount: Set(*amount),
            }
            .insert(self.db())
            .await
            .expect("seed product price");
        }
        product
    }

    pub async fn seed_discount(
        &self,
        code: &str,
        amount_type: &str,
        amount: Decimal,
    ) -> discount::Model {
        discount::ActiveModel {
            id: NotSet,
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            status: Set("active".to_string()),
            amount_type: Set(amount_type.to_string()),
            amount: Set(amount),
            min_charge_amount: Set(Decimal::ZERO),
            use_count: Set(0),
            max_uses: Set(0),
            expires_at: Set(None),
        }
        .insert(self.db())
        .await
        .expect("seed discount")
    }

    pub async fn seed_tax_rate(&self, country: &str, region: &str, rate: Decimal) -> tax_rate::Model {
        tax_rate::ActiveModel {
            id: NotSet,
            country: Set(country.to_string()),
            region: Set(region.to_string()),
            rate: Set(rate),
            status: Set("active".to_string()),
        }
        .insert(self.db())
        .await
        .expect("seed tax rate")
    }

    /// Completed sale of one unit of each price, taxed at the default 8%.
    pub async fn complete_sale(&self, prices: &[Decimal]) -> i64 {
        let mut cart = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let product = self.seed_product(&format!("Ebook {}", i + 1), *price).await;
            cart.push(cart_line(product.id));
        }
        self.state
            .builder
            .build_order(BuildOrderRequest {
                status: Some(OrderStatus::Complete),
                cart,
                ..checkout("buyer@example.com")
            })
            .await
            .expect("build sale")
    }
}

pub fn checkout(email: &str) -> BuildOrderRequest {
    BuildOrderRequest {
        email: email.to_string(),
        name: "Test Buyer".to_string(),
        gateway: "stripe".to_string(),
        address: AddressInput {
            name: "Test Buyer".to_string(),
            address: "1 Market St".to_string(),
            city: "San Francisco".to_string(),
            region: "CA".to_string(),
            postal_code: "94105".to_string(),
            country: "US".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn cart_line(product_id: i64) -> CartLine {
    CartLine {
        product_id,
        price_id: None,
        quantity: 1,
        item_price: None,
        fees: Vec::new(),
    }
}

/// Stripe event wrapping `object`.
pub fn stripe_event(id: &str, event_type: &str, object: Value) -> Event {
    Event {
        id: id.to_string(),
        event_type: event_type.to_string(),
        created: Utc::now().timestamp(),
        data: EventData { object },
    }
}

/// Rounds to cents so values read back from SQLite compare exactly.
pub fn cents(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}
