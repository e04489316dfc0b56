use chrono::{Duration, Utc};
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseTransaction, Set, TransactionTrait};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::StoreSettings;
use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::models::{money, AdjustmentType, Mode, ObjectType, OrderStatus, OrderType};
use crate::repositories::orders as repo;
use crate::services::customers;
use crate::services::order_number::{next_refund_number, refund_number_base};
use crate::services::order_status::{recalculate_product_stats, StatusChange, StatusNotifier};
use crate::services::orders::{insert_adjustment, insert_item, insert_order, NewAdjustment, NewOrder, NewOrderItem};
use crate::services::refund_validator::{
    item_credit_key, RefundLine, RefundScope, RefundValidator, ValidatedRefund,
};

/// Who is asking for a refund.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    /// Shop managers may refund past the refund window
    pub can_manage_shop: bool,
}

impl Actor {
    /// Gateway callbacks and other unattended callers.
    pub fn system() -> Self {
        Self {
            user_id: None,
            can_manage_shop: true,
        }
    }

    pub fn customer(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            can_manage_shop: false,
        }
    }
}

/// Store-specific veto over refunds that pass the built-in checks.
pub trait RefundPolicy: Send + Sync {
    fn allow_refund(&self, _order: &order::Model, _actor: &Actor) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllRefunds;

impl RefundPolicy for AllowAllRefunds {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub order_id: i64,
    pub items: RefundScope,
    pub fees: RefundScope,
}

impl RefundRequest {
    /// Everything still refundable on the order.
    pub fn full(order_id: i64) -> Self {
        Self {
            order_id,
            items: RefundScope::All,
            fees: RefundScope::All,
        }
    }

    pub fn items(order_id: i64, lines: Vec<RefundLine>) -> Self {
        Self {
            order_id,
            items: RefundScope::Lines(lines),
            fees: RefundScope::none(),
        }
    }
}

/// Goodwill credit not tied to any refunded quantity.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

/// Issues refunds and credits as `refund` orders linked to the sale.
#[derive(Clone)]
pub struct RefundService {
    db: Arc<DbPool>,
    settings: StoreSettings,
    notifier: StatusNotifier,
    policy: Arc<dyn RefundPolicy>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl RefundService {
    pub fn new(db: Arc<DbPool>, settings: StoreSettings, notifier: StatusNotifier) -> Self {
        Self {
            db,
            settings,
            notifier,
            policy: Arc::new(AllowAllRefunds),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn RefundPolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn order_lock(&self, order_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start refund transaction");
            ServiceError::DatabaseError(e)
        })
    }

    /// True when `actor` could refund the order right now.
    pub async fn is_order_refundable(
        &self,
        order: &order::Model,
        actor: &Actor,
    ) -> Result<bool, ServiceError> {
        match self.check_refundable(self.db.as_ref(), order, actor).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_refund_rejection() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn check_refundable<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        if order.is_refund() {
            return Err(ServiceError::InvalidOrder(format!(
                "order {} is itself a refund",
                order.id
            )));
        }
        if !order.status().map_or(false, |s| s.is_refundable()) {
            return Err(ServiceError::NotRefundable(format!(
                "order {} has status {}",
                order.id, order.status
            )));
        }
        if repo::net_total(conn, order).await? <= Decimal::ZERO {
            return Err(ServiceError::NotRefundable(format!(
                "order {} has nothing left to refund",
                order.id
            )));
        }

        if !actor.can_manage_shop {
            let window = self.settings.refund_window_days;
            let deadline = order.date_refundable.or_else(|| match window {
                0 => None,
                days => order
                    .date_completed
                    .map(|d| d + Duration::days(i64::from(days))),
            });
            if let Some(deadline) = deadline {
                if deadline < Utc::now() {
                    return Err(ServiceError::RefundNotAllowed(format!(
                        "refund window for order {} closed on {}",
                        order.id,
                        deadline.to_rfc3339()
                    )));
                }
            }
        }

        if !self.policy.allow_refund(order, actor) {
            return Err(ServiceError::RefundNotAllowed(format!(
                "refund of order {} was declined by store policy",
                order.id
            )));
        }
        Ok(())
    }

    /// Refunds the selected items and fees of an order. Returns the id of
    /// the new refund order.
    #[instrument(skip(self, request), fields(order_id = request.order_id))]
    pub async fn refund_order(
        &self,
        actor: &Actor,
        request: RefundRequest,
    ) -> Result<i64, ServiceError> {
        let lock = self.order_lock(request.order_id);
        let _guard = lock.lock().await;

        let txn = self.begin().await?;
        let order = repo::find_order(&txn, request.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOrder(format!("order {} does not exist", request.order_id))
            })?;
        self.check_refundable(&txn, &order, actor).await?;

        let validator = RefundValidator::load(&txn, &order, self.settings.decimals()).await?;
        let validated = validator.validate(&request.items, &request.fees)?;

        self.finish_refund(txn, actor, &order, &validator, validated, OrderStatus::Complete)
            .await
    }

    /// Refunds one item, with its fees, in full.
    #[instrument(skip(self))]
    pub async fn refund_order_item(&self, actor: &Actor, item_id: i64) -> Result<i64, ServiceError> {
        let item = repo::find_item(self.db.as_ref(), item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOrder(format!("order item {} does not exist", item_id))
            })?;

        let lock = self.order_lock(item.order_id);
        let _guard = lock.lock().await;

        let txn = self.begin().await?;
        let order = repo::find_order(&txn, item.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOrder(format!("order {} does not exist", item.order_id))
            })?;
        self.check_refundable(&txn, &order, actor).await?;

        let validator = RefundValidator::load(&txn, &order, self.settings.decimals()).await?;
        let validated = validator.validate(
            &RefundScope::Lines(vec![RefundLine::full(item_id)]),
            &RefundScope::Lines(validator.item_fee_lines(item_id)),
        )?;

        self.finish_refund(
            txn,
            actor,
            &order,
            &validator,
            validated,
            OrderStatus::PartiallyRefunded,
        )
        .await
    }

    async fn finish_refund(
        &self,
        txn: DatabaseTransaction,
        actor: &Actor,
        order: &order::Model,
        validator: &RefundValidator,
        validated: ValidatedRefund,
        refund_status: OrderStatus,
    ) -> Result<i64, ServiceError> {
        let decimals = self.settings.decimals();
        let refund = self.insert_refund_order(&txn, order, refund_status).await?;

        let mut mirrored_items: HashMap<i64, i64> = HashMap::new();
        for line in &validated.items {
            let original = &line.original;
            let mirror = insert_item(
                &txn,
                &refund,
                NewOrderItem {
                    order_id: refund.id,
                    parent: Some(original.id),
                    product_id: original.product_id,
                    product_name: original.product_name.clone(),
                    price_id: original.price_id,
                    cart_index: original.cart_index,
                    status: refund_status,
                    quantity: line.quantity,
                    amount: -original.amount,
                    subtotal: Some(-line.subtotal),
                    discount: -line.discount,
                    tax: -line.tax,
                    total: Some(-line.total),
                },
                decimals,
            )
            .await?;
            mirrored_items.insert(original.id, mirror.id);

            let item_status = if line.settles {
                OrderStatus::Refunded
            } else {
                OrderStatus::PartiallyRefunded
            };
            let mut active: order_item::ActiveModel = original.clone().into();
            active.status = Set(item_status.as_str().to_string());
            active.date_modified = Set(Utc::now());
            active.update(&txn).await?;
        }

        for line in &validated.fees {
            let original = &line.original;
            // Item fees follow their item's mirror when it is part of this refund.
            let mirror_item = (original.object_type == ObjectType::OrderItem.as_ref())
                .then(|| mirrored_items.get(&original.object_id).copied())
                .flatten();
            let (object_type, object_id) = match mirror_item {
                Some(mirror_id) => (ObjectType::OrderItem, mirror_id),
                None => (ObjectType::Order, refund.id),
            };
            let mut adjustment = NewAdjustment::new(object_type, object_id, AdjustmentType::Fee);
            adjustment.parent = Some(original.id);
            adjustment.type_id = original.type_id;
            adjustment.type_key = original.type_key.clone();
            adjustment.description = original.description.clone();
            adjustment.subtotal = -line.subtotal;
            adjustment.tax = -line.tax;
            adjustment.total = Some(-line.total);
            insert_adjustment(&txn, adjustment, decimals).await?;
        }

        if validated.settles_order {
            for (discount, remaining) in validator.unsettled_discounts() {
                let mut adjustment =
                    NewAdjustment::new(ObjectType::Order, refund.id, AdjustmentType::Discount);
                adjustment.parent = Some(discount.id);
                adjustment.type_id = discount.type_id;
                adjustment.description = discount.description.clone();
                adjustment.subtotal = -remaining.subtotal;
                adjustment.total = Some(-remaining.total);
                insert_adjustment(&txn, adjustment, decimals).await?;
            }
        }

        let settled_items: HashSet<i64> = validated
            .items
            .iter()
            .filter(|line| line.settles)
            .map(|line| line.original.id)
            .collect();
        for outstanding in validator.outstanding_credits() {
            let takes_back = validated.settles_order
                || outstanding
                    .item_id
                    .map_or(false, |id| settled_items.contains(&id));
            if !takes_back {
                continue;
            }
            let mut adjustment =
                NewAdjustment::new(ObjectType::Order, refund.id, AdjustmentType::Credit);
            adjustment.parent = Some(outstanding.credit.id);
            adjustment.type_key = outstanding.credit.type_key.clone();
            adjustment.description = outstanding.credit.description.clone();
            adjustment.subtotal = outstanding.amount;
            adjustment.total = Some(outstanding.amount);
            insert_adjustment(&txn, adjustment, decimals).await?;
        }

        let refund = repo::recalculate_totals(&txn, refund.id, decimals).await?;
        let net = repo::net_total(&txn, order).await?;
        if net < Decimal::ZERO {
            warn!(order_id = order.id, net_total = %net, "Refund exceeds what is left after credits");
            txn.rollback().await?;
            return Err(ServiceError::RefundValidation(format!(
                "refund of {} exceeds the {} left on order {}",
                -refund.total,
                net - refund.total,
                order.id
            )));
        }

        repo::insert_note(
            &txn,
            ObjectType::Order,
            order.id,
            &format!("Refund {} issued for {}", refund.order_number, -refund.total),
            actor.user_id,
        )
        .await?;

        let new_status = if net <= Decimal::ZERO {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartiallyRefunded
        };
        let change = self.notifier.apply(&txn, order.id, new_status).await?;

        let product_ids: Vec<i64> = validated.items.iter().map(|i| i.original.product_id).collect();
        recalculate_product_stats(&txn, &product_ids).await?;
        customers::recalculate_customer_stats(&txn, order.customer_id).await?;

        self.commit(txn, order.id, refund.id, change).await?;
        info!(
            order_id = order.id,
            refund_id = refund.id,
            refund_total = %refund.total,
            net_total = %net,
            "Refund issued"
        );
        counter!("edd_orders.refunds.created", 1);
        Ok(refund.id)
    }

    async fn commit(
        &self,
        txn: DatabaseTransaction,
        order_id: i64,
        refund_id: i64,
        change: Option<StatusChange>,
    ) -> Result<(), ServiceError> {
        txn.commit().await.map_err(|e| {
            error!(order_id, error = %e, "Failed to commit refund");
            ServiceError::DatabaseError(e)
        })?;
        if let Some(change) = change {
            self.notifier.notify(&change);
        }
        self.notifier.sink().on_refund_created(order_id, refund_id);
        Ok(())
    }

    /// Inserts the refund-type child that carries the mirrored rows.
    async fn insert_refund_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &order::Model,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing: Vec<String> = repo::find_refunds(conn, parent.id)
            .await?
            .into_iter()
            .map(|r| r.order_number)
            .collect();
        let order_number = next_refund_number(
            &refund_number_base(parent),
            &self.settings.refund_suffix,
            &existing,
        );

        insert_order(
            conn,
            NewOrder {
                parent: parent.id,
                order_number,
                status,
                order_type: OrderType::Refund,
                user_id: parent.user_id,
                customer_id: parent.customer_id,
                email: parent.email.clone(),
                ip: parent.ip.clone(),
                gateway: parent.gateway.clone(),
                mode: Mode::from_str(&parent.mode).unwrap_or_default(),
                currency: parent.currency.clone(),
                tax_rate_id: parent.tax_rate_id,
                date_completed: Some(Utc::now()),
                ..Default::default()
            },
            self.settings.decimals(),
        )
        .await
    }

    /// Credits `amount` against the whole order.
    #[instrument(skip(self, credit), fields(amount = %credit.amount))]
    pub async fn apply_order_credit(
        &self,
        actor: &Actor,
        order_id: i64,
        credit: CreditRequest,
    ) -> Result<i64, ServiceError> {
        let lock = self.order_lock(order_id);
        let _guard = lock.lock().await;

        let txn = self.begin().await?;
        let order = self.credit_target(&txn, order_id).await?;
        let amount = self.credit_amount(&credit)?;

        let net = repo::net_total(&txn, &order).await?;
        if net - amount < Decimal::ZERO {
            warn!(order_id, net_total = %net, "Credit exceeds the order total");
            return Err(ServiceError::InvalidCredit(format!(
                "credit of {} exceeds the order total of {}",
                amount, net
            )));
        }

        let refund_id = self
            .insert_credit(&txn, actor, &order, amount, &credit.description, None)
            .await?;
        self.commit(txn, order.id, refund_id, None).await?;
        counter!("edd_orders.credits.applied", 1);
        Ok(refund_id)
    }

    /// Credits `amount` against one item of an order.
    #[instrument(skip(self, credit), fields(amount = %credit.amount))]
    pub async fn apply_order_item_credit(
        &self,
        actor: &Actor,
        item_id: i64,
        credit: CreditRequest,
    ) -> Result<i64, ServiceError> {
        let item = repo::find_item(self.db.as_ref(), item_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOrder(format!("order item {} does not exist", item_id))
            })?;

        let lock = self.order_lock(item.order_id);
        let _guard = lock.lock().await;

        let txn = self.begin().await?;
        let order = self.credit_target(&txn, item.order_id).await?;
        let amount = self.credit_amount(&credit)?;

        let net = repo::net_total(&txn, &order).await?;
        let item_remaining = self.item_remaining_total(&txn, &order, &item).await?;
        if item_remaining - amount < Decimal::ZERO || net - amount < Decimal::ZERO {
            warn!(order_id = order.id, item_id, item_remaining = %item_remaining, "Credit exceeds the item total");
            return Err(ServiceError::InvalidCredit(format!(
                "credit of {} exceeds the remaining {} on order item {}",
                amount, item_remaining, item_id
            )));
        }

        let refund_id = self
            .insert_credit(&txn, actor, &order, amount, &credit.description, Some(item_id))
            .await?;
        self.commit(txn, order.id, refund_id, None).await?;
        counter!("edd_orders.credits.applied", 1);
        Ok(refund_id)
    }

    async fn credit_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
    ) -> Result<order::Model, ServiceError> {
        match repo::find_order(conn, order_id).await? {
            Some(order) if !order.is_refund() => Ok(order),
            Some(_) => Err(ServiceError::InvalidOrder(format!(
                "order {} is itself a refund",
                order_id
            ))),
            None => Err(ServiceError::InvalidOrder(format!(
                "order {} does not exist",
                order_id
            ))),
        }
    }

    fn credit_amount(&self, credit: &CreditRequest) -> Result<Decimal, ServiceError> {
        let amount = money::sanitize_amount(credit.amount, self.settings.decimals());
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidCredit(
                "credit amount must be greater than zero".to_string(),
            ));
        }
        Ok(amount)
    }

    /// Item total net of mirrors and of earlier credits against the item.
    async fn item_remaining_total<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        item: &order_item::Model,
    ) -> Result<Decimal, ServiceError> {
        let key = item_credit_key(item.id);
        let mut remaining = item.total;
        for refund in repo::find_refunds(conn, order.id).await? {
            let mirrors = repo::find_items(conn, refund.id).await?;
            remaining += mirrors
                .iter()
                .filter(|m| m.parent == Some(item.id))
                .map(|m| m.total)
                .sum::<Decimal>();
            remaining += repo::find_adjustments(conn, refund.id, &[])
                .await?
                .iter()
                .filter(|a| {
                    a.adjustment_type == AdjustmentType::Credit.as_ref()
                        && a.type_key.as_deref() == Some(key.as_str())
                })
                .map(|a| a.total)
                .sum::<Decimal>();
        }
        Ok(remaining)
    }

    async fn insert_credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &Actor,
        order: &order::Model,
        amount: Decimal,
        description: &str,
        item_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        let decimals = self.settings.decimals();
        let refund = self
            .insert_refund_order(conn, order, OrderStatus::Complete)
            .await?;

        let mut adjustment = NewAdjustment::new(ObjectType::Order, refund.id, AdjustmentType::Credit);
        adjustment.type_key = item_id.map(item_credit_key);
        adjustment.description = description.to_string();
        adjustment.subtotal = -amount;
        adjustment.total = Some(-amount);
        insert_adjustment(conn, adjustment, decimals).await?;

        let refund = repo::recalculate_totals(conn, refund.id, decimals).await?;
        repo::insert_note(
            conn,
            ObjectType::Order,
            order.id,
            &format!("Credit {} applied for {}", refund.order_number, amount),
            actor.user_id,
        )
        .await?;
        customers::recalculate_customer_stats(conn, order.customer_id).await?;

        info!(order_id = order.id, refund_id = refund.id, amount = %amount, "Credit applied");
        Ok(refund.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_is_elevated() {
        assert!(Actor::system().can_manage_shop);
        assert!(!Actor::customer(7).can_manage_shop);
        assert_eq!(Actor::customer(7).user_id, Some(7));
    }

    #[test]
    fn full_request_covers_items_and_fees() {
        let request = RefundRequest::full(3);
        assert_eq!(request.items, RefundScope::All);
        assert_eq!(request.fees, RefundScope::All);

        let partial = RefundRequest::items(3, vec![RefundLine::full(9)]);
        assert!(partial.fees.is_none());
    }
}
