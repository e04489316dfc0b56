use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: Option<i64>,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub status: String,
    pub purchase_value: Decimal,
    pub purchase_count: i32,
    pub date_created: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::customer_email::Entity")]
    CustomerEmail,
    #[sea_orm(has_many = "super::customer_address::Entity")]
    CustomerAddress,
}

impl Related<super::customer_email::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerEmail.def()
    }
}

impl Related<super::customer_address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerAddress.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
