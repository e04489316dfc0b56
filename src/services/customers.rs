use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set,
};
use tracing::{debug, info, instrument};

use crate::entities::{customer, customer_address, customer_email, order};
use crate::errors::ServiceError;
use crate::models::{AddressInput, AddressType, OrderType};
use crate::repositories::customers as repo;
use crate::services::order_status::{counted_parents, counts_toward_stats};

const PRIMARY: &str = "primary";
const SECONDARY: &str = "secondary";

/// Finds the customer a checkout belongs to, creating one when needed.
///
/// Matches on the platform account first, then on any email the customer is
/// known by. A checkout email the customer does not have on file yet is
/// attached as a secondary email; the primary one is never overwritten.
#[instrument(skip(conn))]
pub async fn resolve_customer<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<i64>,
    email: &str,
    name: &str,
) -> Result<customer::Model, ServiceError> {
    let email = email.trim();

    let mut found = match user_id {
        Some(uid) => repo::find_by_user_id(conn, uid).await?,
        None => None,
    };
    if found.is_none() && !email.is_empty() {
        found = repo::find_by_email(conn, email).await?;
    }

    let customer = match found {
        Some(existing) => existing,
        None => {
            if email.is_empty() {
                return Err(ServiceError::ValidationError(
                    "a customer needs an email address".to_string(),
                ));
            }
            let created = customer::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                email: Set(email.to_string()),
                name: Set(name.to_string()),
                status: Set("active".to_string()),
                purchase_value: Set(Decimal::ZERO),
                purchase_count: Set(0),
                date_created: Set(Utc::now()),
            }
            .insert(conn)
            .await?;
            add_email(conn, created.id, email, PRIMARY).await?;
            info!(customer_id = created.id, "Created customer");
            return Ok(created);
        }
    };

    if !email.is_empty() && !customer.email.eq_ignore_ascii_case(email) {
        let known = repo::find_emails(conn, customer.id)
            .await?
            .iter()
            .any(|e| e.email.eq_ignore_ascii_case(email));
        if !known {
            add_email(conn, customer.id, email, SECONDARY).await?;
            debug!(customer_id = customer.id, "Attached secondary email to customer");
        }
    }

    Ok(customer)
}

async fn add_email<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
    email: &str,
    email_type: &str,
) -> Result<customer_email::Model, ServiceError> {
    Ok(customer_email::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        email_type: Set(email_type.to_string()),
        email: Set(email.to_string()),
        date_created: Set(Utc::now()),
    }
    .insert(conn)
    .await?)
}

/// Copies an address into the customer's address book unless an equivalent
/// one is already there. Returns whether a row was added.
pub async fn add_address_if_missing<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
    address: &AddressInput,
) -> Result<bool, ServiceError> {
    if address.is_empty() {
        return Ok(false);
    }

    let existing = repo::find_addresses(conn, customer_id).await?;
    if existing
        .iter()
        .any(|row| AddressInput::from(row).same_location(address))
    {
        return Ok(false);
    }

    customer_address::ActiveModel {
        id: NotSet,
        customer_id: Set(customer_id),
        is_primary: Set(existing.is_empty()),
        address_type: Set(AddressType::Billing.as_ref().to_string()),
        name: Set(address.name.clone()),
        address: Set(address.address.clone()),
        address2: Set(address.address2.clone()),
        city: Set(address.city.clone()),
        region: Set(address.region.clone()),
        postal_code: Set(address.postal_code.clone()),
        country: Set(address.country.clone()),
        date_created: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(true)
}

/// Re-derives purchase count and lifetime value from the customer's orders.
///
/// Only sales in a counted status add to the count; refund orders subtract
/// from the value while the sale they reverse is still counted.
pub async fn recalculate_customer_stats<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
) -> Result<(), ServiceError> {
    let Some(customer) = repo::find_customer(conn, customer_id).await? else {
        return Ok(());
    };

    let orders = order::Entity::find()
        .filter(order::Column::CustomerId.eq(customer_id))
        .all(conn)
        .await?;

    let all: Vec<&order::Model> = orders.iter().collect();
    let parents = counted_parents(conn, &all).await?;

    let mut purchase_count = 0;
    let mut purchase_value = Decimal::ZERO;
    for o in all.into_iter().filter(|o| counts_toward_stats(o, &parents)) {
        if o.order_type == OrderType::Sale.as_ref() {
            purchase_count += 1;
        }
        purchase_value += o.total;
    }

    let mut active: customer::ActiveModel = customer.into();
    active.purchase_count = Set(purchase_count);
    active.purchase_value = Set(purchase_value.max(Decimal::ZERO));
    active.update(conn).await?;
    Ok(())
}
