use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Complete,
    Refunded,
    PartiallyRefunded,
    Revoked,
    OnHold,
    Abandoned,
    Processing,
    Failed,
    Cancelled,
    Trash,
    /// Legacy label for `Complete`, still present on migrated rows.
    Publish,
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    /// Statuses an order must be in before a refund is considered.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Publish | Self::PartiallyRefunded | Self::OnHold
        )
    }

    /// Checkout may pick these orders back up instead of inserting a new one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Pending | Self::Abandoned | Self::Failed)
    }

    /// Orders in these statuses count towards sales and earnings.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Publish | Self::PartiallyRefunded | Self::Revoked
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
    Sale,
    Refund,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectType {
    Order,
    OrderItem,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdjustmentType {
    Discount,
    TaxRate,
    Fee,
    Credit,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    #[default]
    Live,
    Test,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AddressType {
    #[default]
    Billing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn statuses_round_trip_through_strings() {
        assert_eq!(OrderStatus::PartiallyRefunded.as_str(), "partially_refunded");
        assert_eq!(OrderStatus::from_str("on_hold").unwrap(), OrderStatus::OnHold);
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn refundable_set_matches_store_policy() {
        let refundable: Vec<_> = [
            OrderStatus::Pending,
            OrderStatus::Complete,
            OrderStatus::Refunded,
            OrderStatus::PartiallyRefunded,
            OrderStatus::OnHold,
            OrderStatus::Publish,
            OrderStatus::Revoked,
        ]
        .into_iter()
        .filter(OrderStatus::is_refundable)
        .collect();
        assert_eq!(
            refundable,
            vec![
                OrderStatus::Complete,
                OrderStatus::PartiallyRefunded,
                OrderStatus::OnHold,
                OrderStatus::Publish
            ]
        );
    }
}
