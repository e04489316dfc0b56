use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entities::{customer_address, order_address};

/// Postal address as captured at checkout or returned by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AddressInput {
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    #[serde(default)]
    #[validate(length(max = 2))]
    pub country: String,
}

impl AddressInput {
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
            && self.address2.is_empty()
            && self.city.is_empty()
            && self.region.is_empty()
            && self.postal_code.is_empty()
            && self.country.is_empty()
    }

    /// Same street location, ignoring the recipient name and letter case.
    pub fn same_location(&self, other: &AddressInput) -> bool {
        fn eq(a: &str, b: &str) -> bool {
            a.trim().eq_ignore_ascii_case(b.trim())
        }
        eq(&self.address, &other.address)
            && eq(&self.address2, &other.address2)
            && eq(&self.city, &other.city)
            && eq(&self.region, &other.region)
            && eq(&self.postal_code, &other.postal_code)
            && eq(&self.country, &other.country)
    }
}

impl From<&order_address::Model> for AddressInput {
    fn from(row: &order_address::Model) -> Self {
        Self {
            name: row.name.clone(),
            address: row.address.clone(),
            address2: row.address2.clone(),
            city: row.city.clone(),
            region: row.region.clone(),
            postal_code: row.postal_code.clone(),
            country: row.country.clone(),
        }
    }
}

impl From<&customer_address::Model> for AddressInput {
    fn from(row: &customer_address::Model) -> Self {
        Self {
            name: row.name.clone(),
            address: row.address.clone(),
            address2: row.address2.clone(),
            city: row.city.clone(),
            region: row.region.clone(),
            postal_code: row.postal_code.clone(),
            country: row.country.clone(),
        }
    }
}
