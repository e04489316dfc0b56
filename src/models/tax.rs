use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate an order was taxed at.
///
/// `Resolved` points at a row in `tax_rates`; `Unresolved` is a bare percent
/// kept in order meta under [`TaxRate::META_KEY`] when no row matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxRate {
    Resolved { id: i64, percent: Decimal },
    Unresolved { percent: Decimal },
}

impl TaxRate {
    pub const META_KEY: &'static str = "tax_rate";

    pub fn percent(&self) -> Decimal {
        match self {
            Self::Resolved { percent, .. } | Self::Unresolved { percent } => *percent,
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Resolved { id, .. } => Some(*id),
            Self::Unresolved { .. } => None,
        }
    }
}
