use metrics::counter;
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::db::DbPool;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::models::{money, AddressInput, AddressType, ObjectType, OrderStatus};
use crate::payments::refunds::GATEWAY;
use crate::payments::{Charge, Dispute, Event, PaymentGateway, Review, StripeAddress};
use crate::repositories::orders as repo;
use crate::services::order_status::StatusNotifier;
use crate::services::orders::{insert_transaction, upsert_address, NewTransaction};
use crate::services::refunds::{Actor, RefundRequest, RefundService};

pub const CHARGE_SUCCEEDED: &str = "charge.succeeded";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const REVIEW_OPENED: &str = "review.opened";
pub const REVIEW_CLOSED: &str = "review.closed";
pub const DISPUTE_CREATED: &str = "charge.dispute.created";

/// Applies Stripe events to the orders they concern.
#[derive(Clone)]
pub struct StripeWebhookReconciler {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    refunds: RefundService,
    notifier: StatusNotifier,
    decimals: u32,
}

impl StripeWebhookReconciler {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        refunds: RefundService,
        notifier: StatusNotifier,
        decimals: u32,
    ) -> Self {
        Self {
            db,
            gateway,
            refunds,
            notifier,
            decimals,
        }
    }

    /// Re-fetches the event from Stripe and applies it. Unknown event types
    /// are acknowledged without changes.
    #[instrument(skip(self))]
    pub async fn process_event_id(&self, event_id: &str) -> Result<(), ServiceError> {
        let event = self.gateway.retrieve_event(event_id).await?;
        debug!(event_type = %event.event_type, "Processing Stripe event");

        let result = self.dispatch(&event).await;
        self.notifier
            .sink()
            .on_gateway_event(&event.event_type, &event.id);

        match &result {
            Ok(()) => {
                counter!("edd_orders.webhooks.processed", 1);
            }
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "Stripe event failed");
                counter!("edd_orders.webhooks.failed", 1);
            }
        }
        result
    }

    async fn dispatch(&self, event: &Event) -> Result<(), ServiceError> {
        match event.event_type.as_str() {
            CHARGE_SUCCEEDED => self.charge_succeeded(&event.object::<Charge>()?).await,
            CHARGE_REFUNDED => self.charge_refunded(&event.object::<Charge>()?).await,
            REVIEW_OPENED | REVIEW_CLOSED => {
                let opened = event.event_type == REVIEW_OPENED;
                self.review(&event.object::<Review>()?, opened).await
            }
            DISPUTE_CREATED => self.dispute_created(&event.object::<Dispute>()?).await,
            other => {
                debug!(event_type = other, "Ignoring Stripe event");
                Ok(())
            }
        }
    }

    /// Order paid with the charge, matched on the charge id first and the
    /// payment intent second.
    async fn find_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        charge_id: Option<&str>,
        payment_intent: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        for id in [charge_id, payment_intent].into_iter().flatten() {
            if let Some(order) = repo::find_order_by_transaction(conn, id).await? {
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    async fn charge_succeeded(&self, charge: &Charge) -> Result<(), ServiceError> {
        let db = self.db.as_ref();
        let Some(order) = self
            .find_order(db, Some(&charge.id), charge.payment_intent.as_deref())
            .await?
        else {
            debug!(charge_id = %charge.id, "No order for charge");
            return Ok(());
        };
        let Some(address) = &charge.billing_details.address else {
            return Ok(());
        };

        let address = billing_address(charge.billing_details.name.as_deref(), address);
        upsert_address(db, order.id, AddressType::Billing, &address).await?;
        info!(order_id = order.id, charge_id = %charge.id, "Billing address updated from Stripe");
        Ok(())
    }

    async fn charge_refunded(&self, charge: &Charge) -> Result<(), ServiceError> {
        if !charge.captured {
            debug!(charge_id = %charge.id, "Ignoring refund of an uncaptured charge");
            return Ok(());
        }

        let db = self.db.as_ref();
        let Some(order) = self
            .find_order(db, Some(&charge.id), charge.payment_intent.as_deref())
            .await?
        else {
            debug!(charge_id = %charge.id, "No order for refunded charge");
            return Ok(());
        };

        let gateway_refund = charge.refunds.data.first();
        if let Some(refund) = gateway_refund {
            if repo::transaction_exists(db, &refund.id).await? {
                debug!(order_id = order.id, refund_id = %refund.id, "Stripe refund already recorded");
                return Ok(());
            }
        }

        if !charge.refunded {
            let refunded = money::from_minor_units(charge.amount_refunded, &charge.currency);
            let txn = db.begin().await?;
            // Never downgrade an order already refunded in full.
            let change = if order.status == OrderStatus::Refunded.as_str() {
                None
            } else {
                self.notifier
                    .apply(&txn, order.id, OrderStatus::PartiallyRefunded)
                    .await?
            };
            repo::insert_note(
                &txn,
                ObjectType::Order,
                order.id,
                &format!(
                    "Charge {} partially refunded in Stripe ({} {})",
                    charge.id,
                    refunded,
                    charge.currency.to_uppercase()
                ),
                None,
            )
            .await?;
            txn.commit().await?;
            if let Some(change) = change {
                self.notifier.notify(&change);
            }
            info!(order_id = order.id, charge_id = %charge.id, "Charge partially refunded");
            return Ok(());
        }

        match self
            .refunds
            .refund_order(&Actor::system(), RefundRequest::full(order.id))
            .await
        {
            Ok(refund_id) => {
                if let Some(refund) = gateway_refund {
                    let total = repo::find_order(db, refund_id)
                        .await?
                        .map(|r| r.total)
                        .unwrap_or_default();
                    insert_transaction(
                        db,
                        NewTransaction {
                            object_id: refund_id,
                            object_type: ObjectType::Order,
                            transaction_id: refund.id.clone(),
                            gateway: GATEWAY.to_string(),
                            status: "complete".to_string(),
                            total,
                        },
                        self.decimals,
                    )
                    .await?;
                }
                info!(order_id = order.id, refund_id, "Charge refunded in Stripe");
                Ok(())
            }
            Err(e) if e.is_refund_rejection() => {
                info!(order_id = order.id, reason = %e, "Refund declined, marking order refunded");
                self.notifier
                    .update_status(db, order.id, OrderStatus::Refunded)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn review(&self, review: &Review, opened: bool) -> Result<(), ServiceError> {
        let charge_id = match (&review.charge, &review.payment_intent) {
            (Some(charge), _) => Some(charge.clone()),
            (None, Some(intent)) => self
                .gateway
                .retrieve_payment_intent(intent)
                .await?
                .latest_charge,
            (None, None) => None,
        };

        let db = self.db.as_ref();
        let Some(order) = self
            .find_order(db, charge_id.as_deref(), review.payment_intent.as_deref())
            .await?
        else {
            debug!(review_id = %review.id, "No order for review");
            return Ok(());
        };

        let charge = charge_id.as_deref().unwrap_or("unknown");
        let note = if opened {
            format!(
                "Stripe review {} opened for charge {}: {}",
                review.id,
                charge,
                review.opened_reason.as_deref().or(review.reason.as_deref()).unwrap_or("unspecified")
            )
        } else {
            format!(
                "Stripe review {} closed for charge {}: {}",
                review.id,
                charge,
                review.reason.as_deref().unwrap_or("unspecified")
            )
        };
        repo::insert_note(db, ObjectType::Order, order.id, &note, None).await?;
        Ok(())
    }

    async fn dispute_created(&self, dispute: &Dispute) -> Result<(), ServiceError> {
        let db = self.db.as_ref();
        let Some(order) = self
            .find_order(db, dispute.charge.as_deref(), dispute.payment_intent.as_deref())
            .await?
        else {
            debug!(dispute_id = %dispute.id, "No order for dispute");
            return Ok(());
        };

        let reason = dispute.reason.as_deref().unwrap_or("unspecified");
        let txn = db.begin().await?;
        let change = self.notifier.apply(&txn, order.id, OrderStatus::OnHold).await?;
        repo::set_meta(&txn, ObjectType::Order, order.id, "dispute_id", &json!(dispute.id)).await?;
        repo::set_meta(&txn, ObjectType::Order, order.id, "dispute_reason", &json!(reason)).await?;
        repo::insert_note(
            &txn,
            ObjectType::Order,
            order.id,
            &format!(
                "Charge {} disputed in Stripe ({}), reason: {}",
                dispute.charge.as_deref().unwrap_or("unknown"),
                dispute.id,
                reason
            ),
            None,
        )
        .await?;
        txn.commit().await?;
        if let Some(change) = change {
            self.notifier.notify(&change);
        }
        warn!(order_id = order.id, dispute_id = %dispute.id, "Order placed on hold by dispute");
        Ok(())
    }
}

fn billing_address(name: Option<&str>, address: &StripeAddress) -> AddressInput {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    AddressInput {
        name: name.unwrap_or_default().to_string(),
        address: field(&address.line1),
        address2: field(&address.line2),
        city: field(&address.city),
        region: field(&address.state),
        postal_code: field(&address.postal_code),
        country: field(&address.country),
    }
}
