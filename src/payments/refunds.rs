use lazy_static::lazy_static;
use metrics::counter;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{PaymentGateway, Refund, RefundParams};
use crate::db::DbPool;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::models::{money, ObjectType};
use crate::repositories::orders as repo;
use crate::services::orders::{insert_transaction, NewTransaction};

pub const GATEWAY: &str = "stripe";

lazy_static! {
    // Orders paid before transactions were recorded kept the charge in a note.
    static ref LEGACY_CHARGE_NOTE: Regex = Regex::new(r"Stripe Charge ID: (ch_\w+)").unwrap();
}

/// Sends refunds for Stripe-paid orders to Stripe.
#[derive(Clone)]
pub struct StripeRefunds {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    decimals: u32,
}

impl StripeRefunds {
    pub fn new(db: Arc<DbPool>, gateway: Arc<dyn PaymentGateway>, decimals: u32) -> Self {
        Self {
            db,
            gateway,
            decimals,
        }
    }

    /// Refunds the order's charge. With a refund order, the refund order's
    /// amount is sent and the gateway refund is recorded against it.
    #[instrument(skip(self))]
    pub async fn refund_purchase(
        &self,
        order_id: i64,
        refund_order_id: Option<i64>,
    ) -> Result<Refund, ServiceError> {
        let db = self.db.as_ref();
        let order = repo::find_order(db, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let refund_order = match refund_order_id {
            Some(id) => {
                let refund = repo::find_order(db, id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
                if !refund.is_refund() || refund.parent != order.id {
                    return Err(ServiceError::ValidationError(format!(
                        "order {} is not a refund of order {}",
                        id, order.id
                    )));
                }
                Some(refund)
            }
            None => None,
        };

        let charge_id = charge_id_for(db, &order).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("No Stripe charge recorded for order {}", order.id))
        })?;

        let amount = refund_amount(&order, refund_order.as_ref());
        let mut params = RefundParams {
            amount: Some(money::to_minor_units(amount, &order.currency)?),
            metadata: vec![("order_id".to_string(), order.id.to_string())],
            ..Default::default()
        };
        if charge_id.starts_with("pi_") {
            params.payment_intent = Some(charge_id.clone());
        } else {
            params.charge = Some(charge_id.clone());
        }
        if let Some(refund) = &refund_order {
            params
                .metadata
                .push(("refund_order_id".to_string(), refund.id.to_string()));
        }

        let refund = self.gateway.create_refund(params).await.map_err(|e| {
            error!(order_id = order.id, charge_id = %charge_id, error = %e, "Stripe refund failed");
            counter!("edd_orders.gateway.refund_failures", 1);
            ServiceError::Gateway(e)
        })?;

        repo::insert_note(
            db,
            ObjectType::Order,
            order.id,
            &format!("Charge {} refunded in Stripe: {}", charge_id, refund.id),
            None,
        )
        .await?;

        if let Some(refund_order) = &refund_order {
            if !repo::transaction_exists(db, &refund.id).await? {
                insert_transaction(
                    db,
                    NewTransaction {
                        object_id: refund_order.id,
                        object_type: ObjectType::Order,
                        transaction_id: refund.id.clone(),
                        gateway: GATEWAY.to_string(),
                        status: "complete".to_string(),
                        total: -amount,
                    },
                    self.decimals,
                )
                .await?;
            }
        }

        info!(order_id = order.id, refund_id = %refund.id, amount = %amount, "Stripe refund created");
        Ok(refund)
    }
}

/// Order total, or the refund order's amount when it is a partial refund.
fn refund_amount(order: &order::Model, refund_order: Option<&order::Model>) -> Decimal {
    match refund_order {
        Some(refund) if refund.total.abs() != order.total => refund.total.abs(),
        _ => order.total,
    }
}

/// Charge (or payment intent) the order was paid with.
pub async fn charge_id_for<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> Result<Option<String>, ServiceError> {
    if let Some(txn) = repo::find_transactions(conn, order.id).await?.into_iter().next() {
        return Ok(Some(txn.transaction_id));
    }

    let notes = repo::find_notes(conn, ObjectType::Order, order.id).await?;
    Ok(notes.iter().find_map(|note| {
        LEGACY_CHARGE_NOTE
            .captures(&note.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(id: i64, total: Decimal) -> order::Model {
        let now = Utc::now();
        order::Model {
            id,
            parent: 0,
            order_number: String::new(),
            status: "complete".into(),
            order_type: "sale".into(),
            user_id: None,
            customer_id: 1,
            email: "buyer@example.com".into(),
            ip: String::new(),
            gateway: GATEWAY.into(),
            mode: "live".into(),
            currency: "USD".into(),
            payment_key: format!("key-{}", id),
            tax_rate_id: None,
            subtotal: total,
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total,
            date_created: now,
            date_modified: now,
            date_completed: Some(now),
            date_refundable: None,
        }
    }

    #[test]
    fn partial_refund_orders_send_their_own_amount() {
        let sale = order(1, dec!(108.00));
        let mut partial = order(2, dec!(-43.20));
        partial.parent = 1;
        partial.order_type = "refund".into();
        assert_eq!(refund_amount(&sale, Some(&partial)), dec!(43.20));

        let mut full = partial.clone();
        full.total = dec!(-108.00);
        assert_eq!(refund_amount(&sale, Some(&full)), dec!(108.00));
        assert_eq!(refund_amount(&sale, None), dec!(108.00));
    }

    #[test]
    fn legacy_note_format_is_recognized() {
        let caps = LEGACY_CHARGE_NOTE
            .captures("Stripe Charge ID: ch_3Nabc123XYZ")
            .unwrap();
        assert_eq!(&caps[1], "ch_3Nabc123XYZ");
        assert!(LEGACY_CHARGE_NOTE.captures("Stripe Charge: ch_1").is_none());
    }
}
