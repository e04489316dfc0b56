use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::entities::{order, order_item, product};
use crate::errors::ServiceError;
use crate::events::OrderEventSink;
use crate::models::{AdjustmentType, ObjectType, OrderStatus, OrderType};
use crate::repositories::{catalog, orders as repo};
use crate::services::customers;

/// A committed status transition, pending notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: i64,
    pub old_status: String,
    pub new_status: String,
}

/// Applies status transitions and everything that hangs off them: the
/// history note, completion dates, sales and customer stats, and listener
/// notification.
#[derive(Clone)]
pub struct StatusNotifier {
    sink: Arc<dyn OrderEventSink>,
    refund_window_days: u32,
}

impl StatusNotifier {
    pub fn new(sink: Arc<dyn OrderEventSink>, refund_window_days: u32) -> Self {
        Self {
            sink,
            refund_window_days,
        }
    }

    pub fn sink(&self) -> &Arc<dyn OrderEventSink> {
        &self.sink
    }

    /// Writes the transition. Returns `None` when the order already has the
    /// status. Listeners are not called; pass the result to [`Self::notify`]
    /// once the surrounding transaction has committed.
    #[instrument(skip(self, conn))]
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        new_status: OrderStatus,
    ) -> Result<Option<StatusChange>, ServiceError> {
        let order = repo::find_order(conn, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == new_status.as_str() {
            debug!(order_id, status = %new_status, "Status unchanged");
            return Ok(None);
        }

        let now = Utc::now();
        let old_status = order.status.clone();
        let first_completion = new_status == OrderStatus::Complete && order.date_completed.is_none();

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(new_status.as_str().to_string());
        active.date_modified = Set(now);
        if new_status == OrderStatus::Complete {
            let completed = order.date_completed.unwrap_or(now);
            if order.date_completed.is_none() {
                active.date_completed = Set(Some(completed));
            }
            if order.date_refundable.is_none() && self.refund_window_days > 0 {
                active.date_refundable =
                    Set(Some(completed + Duration::days(i64::from(self.refund_window_days))));
            }
        }
        active.update(conn).await?;

        repo::insert_note(
            conn,
            ObjectType::Order,
            order_id,
            &format!("Status changed from {} to {}", old_status, new_status),
            None,
        )
        .await?;

        let items = repo::find_items(conn, order_id).await?;
        if follows_order(new_status) {
            for item in items.iter().filter(|i| follows_order_str(&i.status)) {
                let mut active: order_item::ActiveModel = item.clone().into();
                active.status = Set(new_status.as_str().to_string());
                active.date_modified = Set(now);
                active.update(conn).await?;
            }
        }
        let product_ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
        recalculate_product_stats(conn, &product_ids).await?;
        customers::recalculate_customer_stats(conn, order.customer_id).await?;

        if first_completion && order.order_type == OrderType::Sale.as_ref() {
            record_discount_usage(conn, order_id).await?;
        }

        info!(order_id, old_status = %old_status, new_status = %new_status, "Order status changed");
        Ok(Some(StatusChange {
            order_id,
            old_status,
            new_status: new_status.as_str().to_string(),
        }))
    }

    /// Tells listeners about a committed transition. Leaving `complete` is
    /// announced a second time under the legacy `publish` label.
    pub fn notify(&self, change: &StatusChange) {
        self.sink
            .on_status_changed(change.order_id, &change.old_status, &change.new_status);
        if change.old_status == OrderStatus::Complete.as_str() {
            self.sink.on_status_changed(
                change.order_id,
                OrderStatus::Publish.as_str(),
                &change.new_status,
            );
        }
    }

    /// [`Self::apply`] followed by [`Self::notify`]. True when the status changed.
    pub async fn update_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        new_status: OrderStatus,
    ) -> Result<bool, ServiceError> {
        match self.apply(conn, order_id, new_status).await? {
            Some(change) => {
                self.notify(&change);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// Refund statuses are tracked per item by the refund engine.
fn follows_order(status: OrderStatus) -> bool {
    !matches!(
        status,
        OrderStatus::Refunded | OrderStatus::PartiallyRefunded
    )
}

fn follows_order_str(status: &str) -> bool {
    OrderStatus::from_str(status).map_or(true, follows_order)
}

/// Parents of the given refund orders that are themselves in a counted
/// status.
pub(crate) async fn counted_parents<C: ConnectionTrait>(
    conn: &C,
    orders: &[&order::Model],
) -> Result<HashSet<i64>, DbErr> {
    let parent_ids: BTreeSet<i64> = orders
        .iter()
        .filter(|o| o.is_refund())
        .map(|o| o.parent)
        .collect();
    if parent_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let parents = order::Entity::find()
        .filter(order::Column::Id.is_in(parent_ids))
        .all(conn)
        .await?;
    Ok(parents
        .into_iter()
        .filter(|p| p.status().map_or(false, |s| s.is_counted()))
        .map(|p| p.id)
        .collect())
}

/// Whether an order contributes to sales and customer stats. A refund only
/// counts while the sale it reverses does, so a fully refunded sale and its
/// refunds drop out together.
pub(crate) fn counts_toward_stats(order: &order::Model, counted_parents: &HashSet<i64>) -> bool {
    order.status().map_or(false, |s| s.is_counted())
        && (!order.is_refund() || counted_parents.contains(&order.parent))
}

/// Re-derives `sales` and `earnings` for each distinct product.
///
/// Sales count sold quantity minus refunded quantity. Earnings sum item
/// totals, refund rows being negative. See [`counts_toward_stats`] for which
/// orders are considered.
pub async fn recalculate_product_stats<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[i64],
) -> Result<(), ServiceError> {
    let distinct: BTreeSet<i64> = product_ids.iter().copied().collect();

    for product_id in distinct {
        let Some(product) = catalog::find_product(conn, product_id).await? else {
            continue;
        };

        let rows = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .find_also_related(order::Entity)
            .all(conn)
            .await?;

        let owners: Vec<&order::Model> = rows.iter().filter_map(|(_, o)| o.as_ref()).collect();
        let counted = counted_parents(conn, &owners).await?;

        let mut sales: i64 = 0;
        let mut earnings = Decimal::ZERO;
        for (item, owner) in &rows {
            let Some(owner) = owner else { continue };
            if !counts_toward_stats(owner, &counted) {
                continue;
            }
            earnings += item.total;
            if owner.is_refund() {
                sales -= i64::from(item.quantity);
            } else {
                sales += i64::from(item.quantity);
            }
        }

        let mut active: product::ActiveModel = product.into();
        active.sales = Set(sales.max(0));
        active.earnings = Set(earnings);
        active.update(conn).await?;
    }
    Ok(())
}

async fn record_discount_usage<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<(), ServiceError> {
    let adjustments = repo::find_adjustments(conn, order_id, &[]).await?;
    for adjustment in adjustments
        .iter()
        .filter(|a| a.adjustment_type == AdjustmentType::Discount.as_ref())
    {
        let Some(discount_id) = adjustment.type_id else {
            continue;
        };
        match catalog::find_discount(conn, discount_id).await? {
            Some(discount) => {
                let uses = discount.use_count + 1;
                let mut active: crate::entities::discount::ActiveModel = discount.into();
                active.use_count = Set(uses);
                active.update(conn).await?;
            }
            None => warn!(order_id, discount_id, "Discount on order no longer exists"),
        }
    }
    Ok(())
}
