use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

use crate::config::StoreSettings;
use crate::db::DbPool;
use crate::entities::{order, product};
use crate::errors::ServiceError;
use crate::models::{
    money, AddressInput, AddressType, AdjustmentType, Mode, ObjectType, OrderStatus, OrderType,
    TaxRate,
};
use crate::repositories::{catalog, orders as repo};
use crate::services::customers;
use crate::services::order_status::StatusNotifier;
use crate::services::orders::{
    fee_type_key, insert_adjustment, insert_item, insert_order, upsert_address, NewAdjustment,
    NewOrder, NewOrderItem,
};
use crate::services::pricing;

/// A fee submitted with the cart, either order-wide or attached to a line.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CartFee {
    /// Stable key such as `handling`; derived from the label when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    pub amount: Decimal,
    #[serde(default)]
    pub no_tax: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CartLine {
    #[validate(range(min = 1))]
    pub product_id: i64,
    #[serde(default)]
    pub price_id: Option<i64>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Overrides the catalog price
    #[serde(default)]
    pub item_price: Option<Decimal>,
    #[serde(default)]
    pub fees: Vec<CartFee>,
}

fn default_quantity() -> i32 {
    1
}

/// Everything a checkout or an admin form submits to create an order.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BuildOrderRequest {
    /// Order left behind by an earlier, unfinished checkout
    #[serde(default)]
    pub resume_order_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    #[validate]
    pub address: AddressInput,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub mode: Mode,
    /// Store currency when absent
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub purchase_key: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    /// Status to promote the order to once built; stays pending when absent
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    #[validate]
    pub cart: Vec<CartLine>,
    /// Legacy carts: bare product ids priced by `amount`
    #[serde(default)]
    pub legacy_downloads: Vec<i64>,
    /// Legacy carts: flat per-item total
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub fees: Vec<CartFee>,
    #[serde(default)]
    pub discounts: Vec<String>,
    /// Percent the checkout charged, used when no configured rate matches
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
}

struct PricedLine {
    product: product::Model,
    product_name: String,
    price_id: Option<i64>,
    cart_index: i32,
    quantity: i32,
    amount: Decimal,
    subtotal: Decimal,
    fees: Vec<CartFee>,
    /// Legacy lines carry a fixed total and take no discount or tax
    fixed_total: Option<Decimal>,
}

/// Turns checkout input into a normalized order aggregate.
#[derive(Clone)]
pub struct OrderBuilder {
    db: Arc<DbPool>,
    settings: StoreSettings,
    notifier: StatusNotifier,
}

impl OrderBuilder {
    pub fn new(db: Arc<DbPool>, settings: StoreSettings, notifier: StatusNotifier) -> Self {
        Self {
            db,
            settings,
            notifier,
        }
    }

    /// Builds (or rebuilds, when resuming) an order and returns its id.
    #[instrument(skip(self, request), fields(email = %request.email, lines = request.cart.len()))]
    pub async fn build_order(&self, request: BuildOrderRequest) -> Result<i64, ServiceError> {
        if request.cart.is_empty() && request.legacy_downloads.is_empty() {
            return Err(ServiceError::OrderBuildFailed(
                "no cart data supplied".to_string(),
            ));
        }
        request.validate()?;

        let decimals = self.settings.decimals();
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start order build transaction");
            ServiceError::DatabaseError(e)
        })?;

        let customer = customers::resolve_customer(
            &txn,
            request.user_id,
            &request.email,
            &request.name,
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "Customer resolution failed");
            ServiceError::OrderBuildFailed(format!("customer resolution failed: {}", e))
        })?;

        let tax_rate =
            pricing::resolve_tax_rate(&txn, &self.settings, &request.address, request.tax_rate)
                .await?;

        let order = match self.resumable_order(&txn, request.resume_order_id).await? {
            Some(existing) => {
                repo::clear_lines(&txn, existing.id).await?;
                let mut active: order::ActiveModel = existing.into();
                active.status = Set(OrderStatus::Pending.as_str().to_string());
                active.user_id = Set(request.user_id);
                active.customer_id = Set(customer.id);
                active.email = Set(request.email.clone());
                active.ip = Set(request.ip.clone());
                active.gateway = Set(request.gateway.clone());
                active.mode = Set(request.mode.as_ref().to_string());
                active.tax_rate_id = Set(tax_rate.and_then(|t| t.id()));
                active.subtotal = Set(Decimal::ZERO);
                active.discount = Set(Decimal::ZERO);
                active.tax = Set(Decimal::ZERO);
                active.total = Set(Decimal::ZERO);
                active.date_modified = Set(Utc::now());
                let resumed = active.update(&txn).await?;
                info!(order_id = resumed.id, "Resuming recoverable order");
                resumed
            }
            None => {
                insert_order(
                    &txn,
                    NewOrder {
                        order_number: request.order_number.clone().unwrap_or_default(),
                        status: OrderStatus::Pending,
                        order_type: OrderType::Sale,
                        user_id: request.user_id,
                        customer_id: customer.id,
                        email: request.email.clone(),
                        ip: request.ip.clone(),
                        gateway: request.gateway.clone(),
                        mode: request.mode,
                        currency: request
                            .currency
                            .clone()
                            .unwrap_or_else(|| self.settings.currency.clone()),
                        payment_key: request.purchase_key.clone(),
                        tax_rate_id: tax_rate.and_then(|t| t.id()),
                        ..Default::default()
                    },
                    decimals,
                )
                .await?
            }
        };

        if let Some(TaxRate::Unresolved { percent }) = tax_rate {
            repo::set_meta(
                &txn,
                ObjectType::Order,
                order.id,
                TaxRate::META_KEY,
                &serde_json::to_value(percent)?,
            )
            .await?;
        }

        if !request.address.is_empty() {
            upsert_address(&txn, order.id, AddressType::Billing, &request.address).await?;
            customers::add_address_if_missing(&txn, customer.id, &request.address).await?;
        }

        let rate = tax_rate.map(|t| t.percent()).unwrap_or(Decimal::ZERO);
        let lines = self.price_lines(&txn, &request, decimals).await?;
        if lines.is_empty() {
            return Err(ServiceError::OrderBuildFailed(
                "no purchasable products in cart".to_string(),
            ));
        }

        let priced: Vec<Decimal> = lines
            .iter()
            .map(|l| {
                if l.fixed_total.is_some() {
                    Decimal::ZERO
                } else {
                    l.subtotal
                }
            })
            .collect();
        let cart_subtotal: Decimal = priced.iter().copied().sum();
        let discounts =
            pricing::load_discounts(&txn, &request.discounts, cart_subtotal, Utc::now()).await?;
        let allocation = pricing::allocate_discounts(&discounts, &priced, decimals);

        let mut fee_index = 0usize;
        for (line, item_discount) in lines.into_iter().zip(allocation.per_item.iter().copied()) {
            let (discount, tax, total) = match line.fixed_total {
                Some(total) => (Decimal::ZERO, Decimal::ZERO, Some(total)),
                None => (
                    item_discount,
                    money::percent_of(line.subtotal - item_discount, rate, decimals),
                    None,
                ),
            };

            let item = insert_item(
                &txn,
                &order,
                NewOrderItem {
                    order_id: order.id,
                    product_id: line.product.id,
                    product_name: line.product_name,
                    price_id: line.price_id,
                    cart_index: line.cart_index,
                    status: OrderStatus::Pending,
                    quantity: line.quantity,
                    amount: line.amount,
                    subtotal: Some(line.subtotal),
                    discount,
                    tax,
                    total,
                    ..Default::default()
                },
                decimals,
            )
            .await?;

            for fee in &line.fees {
                self.insert_fee(&txn, ObjectType::OrderItem, item.id, fee, fee_index, rate)
                    .await?;
                fee_index += 1;
            }
        }

        for fee in &request.fees {
            self.insert_fee(&txn, ObjectType::Order, order.id, fee, fee_index, rate)
                .await?;
            fee_index += 1;
        }

        for (discount, taken) in discounts.iter().zip(allocation.per_discount.iter()) {
            let mut adjustment =
                NewAdjustment::new(ObjectType::Order, order.id, AdjustmentType::Discount);
            adjustment.type_id = Some(discount.id);
            adjustment.description = discount.code.clone();
            adjustment.subtotal = *taken;
            insert_adjustment(&txn, adjustment, decimals).await?;
        }

        let order = repo::recalculate_totals(&txn, order.id, decimals).await?;

        let change = match request.status {
            Some(status) if status != OrderStatus::Pending => {
                self.notifier.apply(&txn, order.id, status).await?
            }
            _ => None,
        };

        txn.commit().await.map_err(|e| {
            error!(order_id = order.id, error = %e, "Failed to commit order build");
            ServiceError::DatabaseError(e)
        })?;

        if let Some(change) = change {
            self.notifier.notify(&change);
        }
        self.notifier.sink().on_order_built(order.id);
        counter!("edd_orders.orders.built", 1);
        info!(order_id = order.id, total = %order.total, "Order built");
        Ok(order.id)
    }

    /// The order to rebuild in place, when `resume_order_id` names one that
    /// is still recoverable and has never reached the gateway.
    async fn resumable_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        resume_order_id: Option<i64>,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(order_id) = resume_order_id else {
            return Ok(None);
        };
        let Some(existing) = repo::find_order(conn, order_id).await? else {
            debug!(order_id, "Resume target no longer exists");
            return Ok(None);
        };

        let recoverable = existing.status().map_or(false, |s| s.is_recoverable())
            && !existing.is_refund();
        if !recoverable {
            debug!(order_id, status = %existing.status, "Resume target is not recoverable");
            return Ok(None);
        }
        if !repo::find_transactions(conn, order_id).await?.is_empty() {
            debug!(order_id, "Resume target already has a gateway transaction");
            return Ok(None);
        }
        Ok(Some(existing))
    }

    async fn price_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &BuildOrderRequest,
        decimals: u32,
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let mut lines = Vec::new();

        for (index, line) in request.cart.iter().enumerate() {
            let Some(product) = self.purchasable_product(conn, line.product_id).await? else {
                continue;
            };
            let price = pricing::resolve_unit_price(
                conn,
                &product,
                line.price_id,
                line.item_price,
                decimals,
            )
            .await?;
            lines.push(PricedLine {
                product_name: price.product_name,
                price_id: price.price_id,
                cart_index: index as i32,
                quantity: line.quantity,
                amount: price.amount,
                subtotal: money::sanitize_amount(
                    price.amount * Decimal::from(line.quantity),
                    decimals,
                ),
                fees: line.fees.clone(),
                fixed_total: None,
                product,
            });
        }

        if request.cart.is_empty() {
            let amount = money::sanitize_amount(request.amount.unwrap_or(Decimal::ZERO), decimals);
            for (index, product_id) in request.legacy_downloads.iter().enumerate() {
                let Some(product) = self.purchasable_product(conn, *product_id).await? else {
                    continue;
                };
                lines.push(PricedLine {
                    product_name: product.name.clone(),
                    price_id: None,
                    cart_index: index as i32,
                    quantity: 1,
                    amount,
                    subtotal: amount,
                    fees: Vec::new(),
                    fixed_total: Some(amount),
                    product,
                });
            }
        }

        Ok(lines)
    }

    async fn purchasable_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
    ) -> Result<Option<product::Model>, ServiceError> {
        match catalog::find_product(conn, product_id).await? {
            Some(product) if product.status == catalog::PUBLISHED => Ok(Some(product)),
            Some(_) => {
                warn!(product_id, "Skipping unpublished product in cart");
                Ok(None)
            }
            None => {
                warn!(product_id, "Skipping unknown product in cart");
                Ok(None)
            }
        }
    }

    async fn insert_fee<C: ConnectionTrait>(
        &self,
        conn: &C,
        object_type: ObjectType,
        object_id: i64,
        fee: &CartFee,
        index: usize,
        rate: Decimal,
    ) -> Result<(), ServiceError> {
        let decimals = self.settings.decimals();
        let tax = if fee.no_tax || fee.amount < Decimal::ZERO {
            Decimal::ZERO
        } else {
            money::percent_of(fee.amount, rate, decimals)
        };

        let mut adjustment = NewAdjustment::new(object_type, object_id, AdjustmentType::Fee);
        adjustment.type_key = Some(
            fee.id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| fee_type_key(&fee.label, index)),
        );
        adjustment.description = fee.label.clone();
        adjustment.subtotal = fee.amount;
        adjustment.tax = tax;
        insert_adjustment(conn, adjustment, decimals).await?;
        Ok(())
    }
}
