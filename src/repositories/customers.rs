use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{customer, customer_address, customer_email};

pub async fn find_customer<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
) -> Result<Option<customer::Model>, DbErr> {
    customer::Entity::find_by_id(customer_id).one(conn).await
}

pub async fn find_by_user_id<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> Result<Option<customer::Model>, DbErr> {
    customer::Entity::find()
        .filter(customer::Column::UserId.eq(user_id))
        .one(conn)
        .await
}

/// Matches the primary email first, then any secondary address on file.
pub async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<customer::Model>, DbErr> {
    let primary = customer::Entity::find()
        .filter(customer::Column::Email.eq(email))
        .one(conn)
        .await?;
    if primary.is_some() {
        return Ok(primary);
    }

    let secondary = customer_email::Entity::find()
        .filter(customer_email::Column::Email.eq(email))
        .one(conn)
        .await?;
    match secondary {
        Some(row) => find_customer(conn, row.customer_id).await,
        None => Ok(None),
    }
}

pub async fn find_emails<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
) -> Result<Vec<customer_email::Model>, DbErr> {
    customer_email::Entity::find()
        .filter(customer_email::Column::CustomerId.eq(customer_id))
        .order_by_asc(customer_email::Column::Id)
        .all(conn)
        .await
}

pub async fn find_addresses<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
) -> Result<Vec<customer_address::Model>, DbErr> {
    customer_address::Entity::find()
        .filter(customer_address::Column::CustomerId.eq(customer_id))
        .order_by_asc(customer_address::Column::Id)
        .all(conn)
        .await
}
