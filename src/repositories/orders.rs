use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{
    order, order_address, order_adjustment, order_item, order_meta, order_note, order_transaction,
};
use crate::models::{money, AddressType, AdjustmentType, ObjectType, OrderType};

/// Money columns of an order header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// `total = subtotal - discount + tax + fees + credits`.
///
/// Item rows supply subtotal, discount and tax. Fee and credit adjustments
/// contribute their own totals; discount and tax-rate adjustments are
/// informational and already reflected in the items.
pub fn sum_totals(
    items: &[order_item::Model],
    adjustments: &[order_adjustment::Model],
    decimals: u32,
) -> OrderTotals {
    let subtotal: Decimal = items.iter().map(|i| i.subtotal).sum();
    let discount: Decimal = items.iter().map(|i| i.discount).sum();
    let tax: Decimal = items.iter().map(|i| i.tax).sum();
    let extras: Decimal = adjustments
        .iter()
        .filter(|a| {
            a.adjustment_type == AdjustmentType::Fee.as_ref()
                || a.adjustment_type == AdjustmentType::Credit.as_ref()
        })
        .map(|a| a.total)
        .sum();

    OrderTotals {
        subtotal: money::sanitize_amount(subtotal, decimals),
        discount: money::sanitize_amount(discount, decimals),
        tax: money::sanitize_amount(tax, decimals),
        total: money::sanitize_amount(subtotal - discount + tax + extras, decimals),
    }
}

pub async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<Option<order::Model>, DbErr> {
    order::Entity::find_by_id(order_id).one(conn).await
}

/// Refund-type children of an order, oldest first.
pub async fn find_refunds<C: ConnectionTrait>(
    conn: &C,
    parent_id: i64,
) -> Result<Vec<order::Model>, DbErr> {
    order::Entity::find()
        .filter(order::Column::Parent.eq(parent_id))
        .filter(order::Column::OrderType.eq(OrderType::Refund.as_ref()))
        .order_by_asc(order::Column::Id)
        .all(conn)
        .await
}

pub async fn find_item<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
) -> Result<Option<order_item::Model>, DbErr> {
    order_item::Entity::find_by_id(item_id).one(conn).await
}

pub async fn find_items<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<Vec<order_item::Model>, DbErr> {
    order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CartIndex)
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await
}

/// Adjustments scoped to the order itself or to any of the given items.
pub async fn find_adjustments<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    item_ids: &[i64],
) -> Result<Vec<order_adjustment::Model>, DbErr> {
    let mut scope = Condition::any().add(
        Condition::all()
            .add(order_adjustment::Column::ObjectType.eq(ObjectType::Order.as_ref()))
            .add(order_adjustment::Column::ObjectId.eq(order_id)),
    );
    if !item_ids.is_empty() {
        scope = scope.add(
            Condition::all()
                .add(order_adjustment::Column::ObjectType.eq(ObjectType::OrderItem.as_ref()))
                .add(order_adjustment::Column::ObjectId.is_in(item_ids.to_vec())),
        );
    }

    order_adjustment::Entity::find()
        .filter(scope)
        .order_by_asc(order_adjustment::Column::Id)
        .all(conn)
        .await
}

pub async fn find_transactions<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<Vec<order_transaction::Model>, DbErr> {
    order_transaction::Entity::find()
        .filter(order_transaction::Column::ObjectType.eq(ObjectType::Order.as_ref()))
        .filter(order_transaction::Column::ObjectId.eq(order_id))
        .order_by_asc(order_transaction::Column::Id)
        .all(conn)
        .await
}

pub async fn transaction_exists<C: ConnectionTrait>(
    conn: &C,
    transaction_id: &str,
) -> Result<bool, DbErr> {
    Ok(order_transaction::Entity::find()
        .filter(order_transaction::Column::TransactionId.eq(transaction_id))
        .one(conn)
        .await?
        .is_some())
}

/// Order owning the first transaction recorded under `transaction_id`.
pub async fn find_order_by_transaction<C: ConnectionTrait>(
    conn: &C,
    transaction_id: &str,
) -> Result<Option<order::Model>, DbErr> {
    let txn = order_transaction::Entity::find()
        .filter(order_transaction::Column::TransactionId.eq(transaction_id))
        .filter(order_transaction::Column::ObjectType.eq(ObjectType::Order.as_ref()))
        .order_by_asc(order_transaction::Column::Id)
        .one(conn)
        .await?;

    match txn {
        Some(txn) => find_order(conn, txn.object_id).await,
        None => Ok(None),
    }
}

pub async fn find_address<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    address_type: AddressType,
) -> Result<Option<order_address::Model>, DbErr> {
    order_address::Entity::find()
        .filter(order_address::Column::OrderId.eq(order_id))
        .filter(order_address::Column::AddressType.eq(address_type.as_ref()))
        .one(conn)
        .await
}

/// Removes the line items and adjustments of an order being rebuilt.
pub async fn clear_lines<C: ConnectionTrait>(conn: &C, order_id: i64) -> Result<(), DbErr> {
    let item_ids: Vec<i64> = find_items(conn, order_id)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();

    let adjustment_ids: Vec<i64> = find_adjustments(conn, order_id, &item_ids)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();

    if !adjustment_ids.is_empty() {
        order_adjustment::Entity::delete_many()
            .filter(order_adjustment::Column::Id.is_in(adjustment_ids))
            .exec(conn)
            .await?;
    }
    if !item_ids.is_empty() {
        order_item::Entity::delete_many()
            .filter(order_item::Column::Id.is_in(item_ids))
            .exec(conn)
            .await?;
    }
    Ok(())
}

/// Re-derives the header money columns from the item and adjustment rows.
pub async fn recalculate_totals<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    decimals: u32,
) -> Result<order::Model, DbErr> {
    let order = find_order(conn, order_id)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("order {}", order_id)))?;
    let items = find_items(conn, order_id).await?;
    let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
    let adjustments = find_adjustments(conn, order_id, &item_ids).await?;
    let totals = sum_totals(&items, &adjustments, decimals);

    let mut active: order::ActiveModel = order.into();
    active.subtotal = Set(totals.subtotal);
    active.discount = Set(totals.discount);
    active.tax = Set(totals.tax);
    active.total = Set(totals.total);
    active.date_modified = Set(Utc::now());
    active.update(conn).await
}

/// Order total net of every refund and credit recorded against it.
pub async fn net_total<C: ConnectionTrait>(conn: &C, order: &order::Model) -> Result<Decimal, DbErr> {
    let refunded: Decimal = find_refunds(conn, order.id)
        .await?
        .iter()
        .map(|r| r.total)
        .sum();
    Ok(order.total + refunded)
}

pub async fn insert_note<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
    content: &str,
    user_id: Option<i64>,
) -> Result<order_note::Model, DbErr> {
    order_note::ActiveModel {
        id: NotSet,
        object_type: Set(object_type.as_ref().to_string()),
        object_id: Set(object_id),
        content: Set(content.to_string()),
        user_id: Set(user_id),
        date_created: Set(Utc::now()),
    }
    .insert(conn)
    .await
}

pub async fn find_notes<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
) -> Result<Vec<order_note::Model>, DbErr> {
    order_note::Entity::find()
        .filter(order_note::Column::ObjectType.eq(object_type.as_ref()))
        .filter(order_note::Column::ObjectId.eq(object_id))
        .order_by_asc(order_note::Column::Id)
        .all(conn)
        .await
}

async fn find_meta_row<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
    key: &str,
) -> Result<Option<order_meta::Model>, DbErr> {
    order_meta::Entity::find()
        .filter(order_meta::Column::ObjectType.eq(object_type.as_ref()))
        .filter(order_meta::Column::ObjectId.eq(object_id))
        .filter(order_meta::Column::MetaKey.eq(key))
        .order_by_asc(order_meta::Column::Id)
        .one(conn)
        .await
}

/// Overwrites the value stored under (owner, key), inserting when absent.
pub async fn set_meta<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
    key: &str,
    value: &serde_json::Value,
) -> Result<(), DbErr> {
    let encoded = value.to_string();
    match find_meta_row(conn, object_type, object_id, key).await? {
        Some(row) => {
            let mut active: order_meta::ActiveModel = row.into();
            active.meta_value = Set(encoded);
            active.update(conn).await?;
        }
        None => {
            add_meta(conn, object_type, object_id, key, value).await?;
        }
    }
    Ok(())
}

/// Appends another value under (owner, key).
pub async fn add_meta<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
    key: &str,
    value: &serde_json::Value,
) -> Result<order_meta::Model, DbErr> {
    order_meta::ActiveModel {
        id: NotSet,
        object_type: Set(object_type.as_ref().to_string()),
        object_id: Set(object_id),
        meta_key: Set(key.to_string()),
        meta_value: Set(value.to_string()),
    }
    .insert(conn)
    .await
}

/// First value stored under (owner, key).
pub async fn get_meta<C: ConnectionTrait>(
    conn: &C,
    object_type: ObjectType,
    object_id: i64,
    key: &str,
) -> Result<Option<serde_json::Value>, DbErr> {
    let row = find_meta_row(conn, object_type, object_id, key).await?;
    row.map(|r| {
        serde_json::from_str(&r.meta_value)
            .map_err(|e| DbErr::Type(format!("meta {} is not valid JSON: {}", key, e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(subtotal: Decimal, discount: Decimal, tax: Decimal) -> order_item::Model {
        let now = Utc::now();
        order_item::Model {
            id: 1,
            parent: None,
            order_id: 1,
            product_id: 1,
            product_name: "Ebook".into(),
            price_id: None,
            cart_index: 0,
            status: "complete".into(),
            quantity: 1,
            amount: subtotal,
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
            date_created: now,
            date_modified: now,
        }
    }

    fn adjustment(kind: AdjustmentType, subtotal: Decimal, tax: Decimal) -> order_adjustment::Model {
        let now = Utc::now();
        order_adjustment::Model {
            id: 1,
            parent: None,
            object_id: 1,
            object_type: "order".into(),
            adjustment_type: kind.as_ref().to_string(),
            type_id: None,
            type_key: None,
            description: String::new(),
            subtotal,
            tax,
            total: subtotal + tax,
            date_created: now,
            date_modified: now,
        }
    }

    #[test]
    fn totals_include_fees_and_credits_only() {
        let items = vec![
            item(dec!(60.00), dec!(6.00), dec!(4.32)),
            item(dec!(40.00), dec!(4.00), dec!(2.88)),
        ];
        let adjustments = vec![
            adjustment(AdjustmentType::Fee, dec!(5.00), dec!(0.40)),
            adjustment(AdjustmentType::Discount, dec!(10.00), Decimal::ZERO),
            adjustment(AdjustmentType::Credit, dec!(-2.00), Decimal::ZERO),
        ];

        let totals = sum_totals(&items, &adjustments, 2);
        assert_eq!(totals.subtotal, dec!(100.00));
        assert_eq!(totals.discount, dec!(10.00));
        assert_eq!(totals.tax, dec!(7.20));
        assert_eq!(totals.total, dec!(100.60));
    }

    #[test]
    fn empty_order_totals_zero() {
        assert_eq!(sum_totals(&[], &[], 2), OrderTotals::default());
    }
}
