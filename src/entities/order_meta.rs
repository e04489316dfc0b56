use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_meta")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub object_type: String,
    pub object_id: i64,
    pub meta_key: String,
    /// JSON-encoded value
    pub meta_value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
