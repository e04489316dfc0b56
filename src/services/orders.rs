use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ConnectionTrait, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{order, order_address, order_adjustment, order_item, order_note, order_transaction};
use crate::errors::ServiceError;
use crate::models::{
    money, AddressInput, AddressType, AdjustmentType, Mode, ObjectType, OrderStatus, OrderType,
};
use crate::repositories::orders as repo;
use crate::services::order_status::StatusNotifier;

/// Header fields for a new order. Money columns are normally left at zero and
/// derived from the rows added afterwards.
#[derive(Debug, Clone, Validate)]
pub struct NewOrder {
    pub parent: i64,
    pub order_number: String,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub user_id: Option<i64>,
    #[validate(range(min = 1))]
    pub customer_id: i64,
    #[validate(email)]
    pub email: String,
    pub ip: String,
    pub gateway: String,
    pub mode: Mode,
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Generated when absent
    pub payment_key: Option<String>,
    pub tax_rate_id: Option<i64>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub date_completed: Option<DateTime<Utc>>,
    pub date_refundable: Option<DateTime<Utc>>,
}

impl Default for NewOrder {
    fn default() -> Self {
        Self {
            parent: 0,
            order_number: String::new(),
            status: OrderStatus::Pending,
            order_type: OrderType::Sale,
            user_id: None,
            customer_id: 0,
            email: String::new(),
            ip: String::new(),
            gateway: "manual".to_string(),
            mode: Mode::Live,
            currency: "USD".to_string(),
            payment_key: None,
            tax_rate_id: None,
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            date_completed: None,
            date_refundable: None,
        }
    }
}

/// Partial header update. Status changes go through the notifier.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub order_number: Option<String>,
    pub status: Option<OrderStatus>,
    pub user_id: Option<Option<i64>>,
    pub customer_id: Option<i64>,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub gateway: Option<String>,
    pub mode: Option<Mode>,
    pub tax_rate_id: Option<Option<i64>>,
    /// Amounts recorded as reported by a gateway, bypassing recomputation
    pub subtotal: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
    pub date_completed: Option<Option<DateTime<Utc>>>,
    pub date_refundable: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Validate)]
pub struct NewOrderItem {
    #[validate(range(min = 1))]
    pub order_id: i64,
    /// Original item this row mirrors on a refund order
    pub parent: Option<i64>,
    #[validate(range(min = 1))]
    pub product_id: i64,
    pub product_name: String,
    pub price_id: Option<i64>,
    pub cart_index: i32,
    pub status: OrderStatus,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Unit price
    pub amount: Decimal,
    /// Defaults to `amount * quantity`
    pub subtotal: Option<Decimal>,
    pub discount: Decimal,
    pub tax: Decimal,
    /// Defaults to `subtotal - discount + tax`
    pub total: Option<Decimal>,
}

impl Default for NewOrderItem {
    fn default() -> Self {
        Self {
            order_id: 0,
            parent: None,
            product_id: 0,
            product_name: String::new(),
            price_id: None,
            cart_index: 0,
            status: OrderStatus::Pending,
            quantity: 1,
            amount: Decimal::ZERO,
            subtotal: None,
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderItemUpdate {
    pub status: Option<OrderStatus>,
    pub quantity: Option<i32>,
    pub amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax: Option<Decimal>,
}

#[derive(Debug, Clone, Validate)]
pub struct NewAdjustment {
    #[validate(range(min = 1))]
    pub object_id: i64,
    pub object_type: ObjectType,
    pub adjustment_type: AdjustmentType,
    pub parent: Option<i64>,
    pub type_id: Option<i64>,
    pub type_key: Option<String>,
    pub description: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    /// Defaults to `subtotal + tax`
    pub total: Option<Decimal>,
}

impl NewAdjustment {
    pub fn new(object_type: ObjectType, object_id: i64, adjustment_type: AdjustmentType) -> Self {
        Self {
            object_id,
            object_type,
            adjustment_type,
            parent: None,
            type_id: None,
            type_key: None,
            description: String::new(),
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: None,
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct NewTransaction {
    #[validate(range(min = 1))]
    pub object_id: i64,
    pub object_type: ObjectType,
    #[validate(length(min = 1))]
    pub transaction_id: String,
    pub gateway: String,
    pub status: String,
    pub total: Decimal,
}

/// An order with every row that belongs to it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderAggregate {
    pub order: order::Model,
    pub address: Option<order_address::Model>,
    pub items: Vec<order_item::Model>,
    pub adjustments: Vec<order_adjustment::Model>,
    pub transactions: Vec<order_transaction::Model>,
    pub refunds: Vec<order::Model>,
}

/// Stable key for a fee that has no numeric id: the slugified description,
/// or its position when the description has nothing usable.
pub fn fee_type_key(description: &str, index: usize) -> String {
    let mut slug = String::with_capacity(description.len());
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("fee-{}", index)
    } else {
        slug.to_string()
    }
}

pub(crate) async fn insert_order<C: ConnectionTrait>(
    conn: &C,
    input: NewOrder,
    decimals: u32,
) -> Result<order::Model, ServiceError> {
    input.validate()?;
    let now = Utc::now();
    let payment_key = input
        .payment_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    Ok(order::ActiveModel {
        id: NotSet,
        parent: Set(input.parent),
        order_number: Set(input.order_number),
        status: Set(input.status.as_str().to_string()),
        order_type: Set(input.order_type.as_ref().to_string()),
        user_id: Set(input.user_id),
        customer_id: Set(input.customer_id),
        email: Set(input.email),
        ip: Set(input.ip),
        gateway: Set(input.gateway),
        mode: Set(input.mode.as_ref().to_string()),
        currency: Set(input.currency.to_uppercase()),
        payment_key: Set(payment_key),
        tax_rate_id: Set(input.tax_rate_id),
        subtotal: Set(money::sanitize_amount(input.subtotal, decimals)),
        discount: Set(money::sanitize_amount(input.discount, decimals)),
        tax: Set(money::sanitize_amount(input.tax, decimals)),
        total: Set(money::sanitize_amount(input.total, decimals)),
        date_created: Set(now),
        date_modified: Set(now),
        date_completed: Set(input.date_completed),
        date_refundable: Set(input.date_refundable),
    }
    .insert(conn)
    .await?)
}

/// Item total, never negative on a sale.
fn item_total(order_type: &str, subtotal: Decimal, discount: Decimal, tax: Decimal) -> Decimal {
    let total = subtotal - discount + tax;
    if order_type == OrderType::Sale.as_ref() {
        total.max(Decimal::ZERO)
    } else {
        total
    }
}

pub(crate) async fn insert_item<C: ConnectionTrait>(
    conn: &C,
    owner: &order::Model,
    input: NewOrderItem,
    decimals: u32,
) -> Result<order_item::Model, ServiceError> {
    input.validate()?;
    let now = Utc::now();
    let amount = money::sanitize_amount(input.amount, decimals);
    let subtotal = money::sanitize_amount(
        input
            .subtotal
            .unwrap_or_else(|| amount * Decimal::from(input.quantity)),
        decimals,
    );
    let discount = money::sanitize_amount(input.discount, decimals);
    let tax = money::sanitize_amount(input.tax, decimals);
    let total = match input.total {
        Some(total) => item_total(&owner.order_type, total, Decimal::ZERO, Decimal::ZERO),
        None => item_total(&owner.order_type, subtotal, discount, tax),
    };

    Ok(order_item::ActiveModel {
        id: NotSet,
        parent: Set(input.parent),
        order_id: Set(owner.id),
        product_id: Set(input.product_id),
        product_name: Set(input.product_name),
        price_id: Set(input.price_id),
        cart_index: Set(input.cart_index),
        status: Set(input.status.as_str().to_string()),
        quantity: Set(input.quantity),
        amount: Set(amount),
        subtotal: Set(subtotal),
        discount: Set(discount),
        tax: Set(tax),
        total: Set(money::sanitize_amount(total, decimals)),
        date_created: Set(now),
        date_modified: Set(now),
    }
    .insert(conn)
    .await?)
}

pub(crate) async fn insert_adjustment<C: ConnectionTrait>(
    conn: &C,
    input: NewAdjustment,
    decimals: u32,
) -> Result<order_adjustment::Model, ServiceError> {
    input.validate()?;
    if input.adjustment_type == AdjustmentType::Discount && input.type_id.is_none() {
        return Err(ServiceError::ValidationError(
            "discount adjustments must reference a discount".to_string(),
        ));
    }

    let now = Utc::now();
    let subtotal = money::sanitize_amount(input.subtotal, decimals);
    let tax = money::sanitize_amount(input.tax, decimals);
    let total = money::sanitize_amount(input.total.unwrap_or(subtotal + tax), decimals);

    Ok(order_adjustment::ActiveModel {
        id: NotSet,
        parent: Set(input.parent),
        object_id: Set(input.object_id),
        object_type: Set(input.object_type.as_ref().to_string()),
        adjustment_type: Set(input.adjustment_type.as_ref().to_string()),
        type_id: Set(input.type_id),
        type_key: Set(input.type_key),
        description: Set(input.description),
        subtotal: Set(subtotal),
        tax: Set(tax),
        total: Set(total),
        date_created: Set(now),
        date_modified: Set(now),
    }
    .insert(conn)
    .await?)
}

pub(crate) async fn insert_transaction<C: ConnectionTrait>(
    conn: &C,
    input: NewTransaction,
    decimals: u32,
) -> Result<order_transaction::Model, ServiceError> {
    input.validate()?;
    Ok(order_transaction::ActiveModel {
        id: NotSet,
        object_id: Set(input.object_id),
        object_type: Set(input.object_type.as_ref().to_string()),
        transaction_id: Set(input.transaction_id),
        gateway: Set(input.gateway),
        status: Set(input.status),
        total: Set(money::sanitize_amount(input.total, decimals)),
        date_created: Set(Utc::now()),
    }
    .insert(conn)
    .await?)
}

/// Inserts the address, or overwrites the one already stored for
/// (order, type).
pub(crate) async fn upsert_address<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    address_type: AddressType,
    input: &AddressInput,
) -> Result<order_address::Model, ServiceError> {
    input.validate()?;
    let now = Utc::now();

    let row = match repo::find_address(conn, order_id, address_type).await? {
        Some(existing) => {
            let mut active: order_address::ActiveModel = existing.into();
            active.name = Set(input.name.clone());
            active.address = Set(input.address.clone());
            active.address2 = Set(input.address2.clone());
            active.city = Set(input.city.clone());
            active.region = Set(input.region.clone());
            active.postal_code = Set(input.postal_code.clone());
            active.country = Set(input.country.clone());
            active.date_modified = Set(now);
            active.update(conn).await?
        }
        None => {
            order_address::ActiveModel {
                id: NotSet,
                order_id: Set(order_id),
                address_type: Set(address_type.as_ref().to_string()),
                name: Set(input.name.clone()),
                address: Set(input.address.clone()),
                address2: Set(input.address2.clone()),
                city: Set(input.city.clone()),
                region: Set(input.region.clone()),
                postal_code: Set(input.postal_code.clone()),
                country: Set(input.country.clone()),
                date_created: Set(now),
                date_modified: Set(now),
            }
            .insert(conn)
            .await?
        }
    };
    Ok(row)
}

/// Order owning an adjustment target, resolving item-scoped adjustments
/// through their item.
async fn owning_order_id<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
) -> Result<i64, ServiceError> {
    match object_type {
        ObjectType::Order => Ok(object_id),
        ObjectType::OrderItem => repo::find_item(conn, object_id)
            .await?
            .map(|item| item.order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", object_id))),
    }
}

/// CRUD surface over orders and the rows hanging off them.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    notifier: StatusNotifier,
    decimals: u32,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, notifier: StatusNotifier, decimals: u32) -> Self {
        Self {
            db,
            notifier,
            decimals,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    async fn require_order(&self, order_id: i64) -> Result<order::Model, ServiceError> {
        repo::find_order(&*self.db, order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self, input), fields(customer_id = input.customer_id))]
    pub async fn add_order(&self, input: NewOrder) -> Result<i64, ServiceError> {
        let order = insert_order(&*self.db, input, self.decimals).await?;
        info!(order_id = order.id, "Order created");
        Ok(order.id)
    }

    #[instrument(skip(self, update))]
    pub async fn update_order(
        &self,
        order_id: i64,
        update: OrderUpdate,
    ) -> Result<order::Model, ServiceError> {
        let order = self.require_order(order_id).await?;
        let mut active: order::ActiveModel = order.into();

        if let Some(v) = update.order_number {
            active.order_number = Set(v);
        }
        if let Some(v) = update.user_id {
            active.user_id = Set(v);
        }
        if let Some(v) = update.customer_id {
            active.customer_id = Set(v);
        }
        if let Some(v) = update.email {
            active.email = Set(v);
        }
        if let Some(v) = update.ip {
            active.ip = Set(v);
        }
        if let Some(v) = update.gateway {
            active.gateway = Set(v);
        }
        if let Some(v) = update.mode {
            active.mode = Set(v.as_ref().to_string());
        }
        if let Some(v) = update.tax_rate_id {
            active.tax_rate_id = Set(v);
        }
        if let Some(v) = update.subtotal {
            active.subtotal = Set(money::sanitize_amount(v, self.decimals));
        }
        if let Some(v) = update.discount {
            active.discount = Set(money::sanitize_amount(v, self.decimals));
        }
        if let Some(v) = update.tax {
            active.tax = Set(money::sanitize_amount(v, self.decimals));
        }
        if let Some(v) = update.total {
            active.total = Set(money::sanitize_amount(v, self.decimals));
        }
        if let Some(v) = update.date_completed {
            active.date_completed = Set(v);
        }
        if let Some(v) = update.date_refundable {
            active.date_refundable = Set(v);
        }
        active.date_modified = Set(Utc::now());
        active.update(&*self.db).await.map_err(|e| {
            error!(order_id, error = %e, "Failed to update order");
            ServiceError::DatabaseError(e)
        })?;

        if let Some(status) = update.status {
            self.update_order_status(order_id, status).await?;
        }
        self.require_order(order_id).await
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<order::Model>, ServiceError> {
        Ok(repo::find_order(&*self.db, order_id).await?)
    }

    /// Adds a line item and recomputes the order totals.
    #[instrument(skip(self, input), fields(order_id = input.order_id, product_id = input.product_id))]
    pub async fn add_order_item(&self, input: NewOrderItem) -> Result<i64, ServiceError> {
        let order = self.require_order(input.order_id).await?;
        let item = insert_item(&*self.db, &order, input, self.decimals).await?;
        repo::recalculate_totals(&*self.db, order.id, self.decimals).await?;
        Ok(item.id)
    }

    #[instrument(skip(self, update))]
    pub async fn update_order_item(
        &self,
        item_id: i64,
        update: OrderItemUpdate,
    ) -> Result<order_item::Model, ServiceError> {
        let item = repo::find_item(&*self.db, item_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", item_id)))?;
        let order = self.require_order(item.order_id).await?;

        let quantity = update.quantity.unwrap_or(item.quantity);
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        let amount = update.amount.unwrap_or(item.amount);
        let subtotal = match update.subtotal {
            Some(subtotal) => subtotal,
            None if update.amount.is_some() || update.quantity.is_some() => {
                amount * Decimal::from(quantity)
            }
            None => item.subtotal,
        };
        let discount = update.discount.unwrap_or(item.discount);
        let tax = update.tax.unwrap_or(item.tax);
        let total = item_total(&order.order_type, subtotal, discount, tax);

        let mut active: order_item::ActiveModel = item.into();
        if let Some(status) = update.status {
            active.status = Set(status.as_str().to_string());
        }
        active.quantity = Set(quantity);
        active.amount = Set(money::sanitize_amount(amount, self.decimals));
        active.subtotal = Set(money::sanitize_amount(subtotal, self.decimals));
        active.discount = Set(money::sanitize_amount(discount, self.decimals));
        active.tax = Set(money::sanitize_amount(tax, self.decimals));
        active.total = Set(money::sanitize_amount(total, self.decimals));
        active.date_modified = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        repo::recalculate_totals(&*self.db, order.id, self.decimals).await?;
        Ok(updated)
    }

    /// Adds a discount, fee, credit or tax line and recomputes the order
    /// totals. Fees without an id get a `type_key` derived from their
    /// description or position.
    #[instrument(skip(self, input), fields(object_id = input.object_id))]
    pub async fn add_order_adjustment(&self, mut input: NewAdjustment) -> Result<i64, ServiceError> {
        let order_id = owning_order_id(&*self.db, input.object_type, input.object_id).await?;
        self.require_order(order_id).await?;

        if input.adjustment_type == AdjustmentType::Fee
            && input.type_id.is_none()
            && input.type_key.is_none()
        {
            let items: Vec<i64> = repo::find_items(&*self.db, order_id)
                .await?
                .iter()
                .map(|i| i.id)
                .collect();
            let fees = repo::find_adjustments(&*self.db, order_id, &items)
                .await?
                .iter()
                .filter(|a| a.adjustment_type == AdjustmentType::Fee.as_ref())
                .count();
            input.type_key = Some(fee_type_key(&input.description, fees));
        }

        let adjustment = insert_adjustment(&*self.db, input, self.decimals).await?;
        repo::recalculate_totals(&*self.db, order_id, self.decimals).await?;
        Ok(adjustment.id)
    }

    /// Appends a gateway transaction. Transactions are never updated.
    #[instrument(skip(self, input), fields(object_id = input.object_id, transaction_id = %input.transaction_id))]
    pub async fn add_order_transaction(&self, input: NewTransaction) -> Result<i64, ServiceError> {
        if input.object_type == ObjectType::Order {
            self.require_order(input.object_id).await?;
        }
        let txn = insert_transaction(&*self.db, input, self.decimals).await?;
        Ok(txn.id)
    }

    /// Stores the order's address; a second address of the same type
    /// overwrites the first.
    #[instrument(skip(self, address))]
    pub async fn add_order_address(
        &self,
        order_id: i64,
        address_type: AddressType,
        address: &AddressInput,
    ) -> Result<i64, ServiceError> {
        self.require_order(order_id).await?;
        let row = upsert_address(&*self.db, order_id, address_type, address).await?;
        Ok(row.id)
    }

    /// Order total net of every refund and credit issued against it.
    pub async fn get_order_total(&self, order_id: i64) -> Result<Decimal, ServiceError> {
        let order = self.require_order(order_id).await?;
        Ok(repo::net_total(&*self.db, &order).await?)
    }

    /// Moves the order to `status`. False when it already had it.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<bool, ServiceError> {
        self.notifier
            .update_status(&*self.db, order_id, status)
            .await
    }

    pub async fn recalculate_totals(&self, order_id: i64) -> Result<order::Model, ServiceError> {
        self.require_order(order_id).await?;
        Ok(repo::recalculate_totals(&*self.db, order_id, self.decimals).await?)
    }

    pub async fn add_order_note(
        &self,
        order_id: i64,
        content: &str,
        user_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "note content is required".to_string(),
            ));
        }
        self.require_order(order_id).await?;
        let note = repo::insert_note(&*self.db, ObjectType::Order, order_id, content, user_id).await?;
        Ok(note.id)
    }

    pub async fn get_order_notes(&self, order_id: i64) -> Result<Vec<order_note::Model>, ServiceError> {
        Ok(repo::find_notes(&*self.db, ObjectType::Order, order_id).await?)
    }

    /// Overwrites `key` on the order.
    pub async fn update_order_meta(
        &self,
        order_id: i64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.require_order(order_id).await?;
        Ok(repo::set_meta(&*self.db, ObjectType::Order, order_id, key, &value).await?)
    }

    /// Appends another value under `key` on the order.
    pub async fn add_order_meta(
        &self,
        order_id: i64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.require_order(order_id).await?;
        repo::add_meta(&*self.db, ObjectType::Order, order_id, key, &value).await?;
        Ok(())
    }

    pub async fn get_order_meta(
        &self,
        order_id: i64,
        key: &str,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        Ok(repo::get_meta(&*self.db, ObjectType::Order, order_id, key).await?)
    }

    pub async fn get_order_aggregate(&self, order_id: i64) -> Result<OrderAggregate, ServiceError> {
        let order = self.require_order(order_id).await?;
        let db = &*self.db;
        let items = repo::find_items(db, order_id).await?;
        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();

        Ok(OrderAggregate {
            address: repo::find_address(db, order_id, AddressType::Billing).await?,
            adjustments: repo::find_adjustments(db, order_id, &item_ids).await?,
            transactions: repo::find_transactions(db, order_id).await?,
            refunds: repo::find_refunds(db, order_id).await?,
            items,
            order,
        })
    }
}
