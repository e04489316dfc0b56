use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount, fee, credit or tax line attached to an order or an order item.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_adjustments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Original adjustment a refund row mirrors
    pub parent: Option<i64>,
    pub object_id: i64,
    pub object_type: String,
    #[sea_orm(column_name = "type")]
    pub adjustment_type: String,
    pub type_id: Option<i64>,
    pub type_key: Option<String>,
    pub description: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
