use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::{OrderStatus, OrderType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order this one refunds, 0 for sales
    pub parent: i64,
    pub order_number: String,
    pub status: String,
    #[sea_orm(column_name = "type")]
    pub order_type: String,
    pub user_id: Option<i64>,
    pub customer_id: i64,
    pub email: String,
    pub ip: String,
    pub gateway: String,
    pub mode: String,
    pub currency: String,
    #[sea_orm(unique)]
    pub payment_key: String,
    pub tax_rate_id: Option<i64>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub date_completed: Option<DateTime<Utc>>,
    pub date_refundable: Option<DateTime<Utc>>,
}

impl Model {
    /// Parsed status; `None` for labels written by extensions.
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::from_str(&self.status).ok()
    }

    pub fn is_refund(&self) -> bool {
        self.order_type == OrderType::Refund.as_ref()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::order_address::Entity")]
    OrderAddress,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::order_address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderAddress.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
