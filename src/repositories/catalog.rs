use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{discount, product, product_price, tax_rate};

pub const ACTIVE: &str = "active";
pub const PUBLISHED: &str = "publish";

pub async fn find_product<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
) -> Result<Option<product::Model>, DbErr> {
    product::Entity::find_by_id(product_id).one(conn).await
}

pub async fn find_prices<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
) -> Result<Vec<product_price::Model>, DbErr> {
    product_price::Entity::find()
        .filter(product_price::Column::ProductId.eq(product_id))
        .order_by_asc(product_price::Column::PriceIndex)
        .all(conn)
        .await
}

pub async fn find_discount_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<discount::Model>, DbErr> {
    discount::Entity::find()
        .filter(discount::Column::Code.eq(code))
        .one(conn)
        .await
}

pub async fn find_discount<C: ConnectionTrait>(
    conn: &C,
    discount_id: i64,
) -> Result<Option<discount::Model>, DbErr> {
    discount::Entity::find_by_id(discount_id).one(conn).await
}

/// Active rate for (country, region), falling back to the country-wide rate.
pub async fn find_tax_rate<C: ConnectionTrait>(
    conn: &C,
    country: &str,
    region: &str,
) -> Result<Option<tax_rate::Model>, DbErr> {
    if country.is_empty() {
        return Ok(None);
    }

    if !region.is_empty() {
        let regional = tax_rate::Entity::find()
            .filter(tax_rate::Column::Country.eq(country))
            .filter(tax_rate::Column::Region.eq(region))
            .filter(tax_rate::Column::Status.eq(ACTIVE))
            .one(conn)
            .await?;
        if regional.is_some() {
            return Ok(regional);
        }
    }

    tax_rate::Entity::find()
        .filter(tax_rate::Column::Country.eq(country))
        .filter(tax_rate::Column::Region.eq(""))
        .filter(tax_rate::Column::Status.eq(ACTIVE))
        .one(conn)
        .await
}
