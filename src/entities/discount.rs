use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub status: String,
    /// "percent" or "flat"
    pub amount_type: String,
    pub amount: Decimal,
    pub min_charge_amount: Decimal,
    pub use_count: i32,
    /// 0 = unlimited
    pub max_uses: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_percent(&self) -> bool {
        self.amount_type == "percent"
    }

    /// Active, unexpired and not exhausted.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == "active"
            && self.expires_at.map_or(true, |expires| expires > now)
            && (self.max_uses == 0 || self.use_count < self.max_uses)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
