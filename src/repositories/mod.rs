//! Query helpers generic over [`sea_orm::ConnectionTrait`], so the same call
//! works against the pool or inside an open transaction.

pub mod catalog;
pub mod customers;
pub mod orders;
