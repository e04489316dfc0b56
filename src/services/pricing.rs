use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use tracing::warn;

use crate::config::StoreSettings;
use crate::entities::{discount, product};
use crate::errors::ServiceError;
use crate::models::{money, AddressInput, TaxRate};
use crate::repositories::catalog;

/// Sentinel a checkout sends when no discount applies.
pub const NO_DISCOUNT: &str = "none";

/// Unit price and display name for a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub amount: Decimal,
    pub product_name: String,
    pub price_id: Option<i64>,
}

/// Resolves the unit price of a cart line.
///
/// An explicit override wins. Variable-priced products use the option named
/// by `price_id`, falling back to their lowest option; everything else uses
/// the flat price.
pub async fn resolve_unit_price<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
    price_id: Option<i64>,
    override_amount: Option<Decimal>,
    decimals: u32,
) -> Result<ResolvedPrice, ServiceError> {
    let mut resolved = ResolvedPrice {
        amount: product.price,
        product_name: product.name.clone(),
        price_id: None,
    };

    if product.variable_pricing {
        let prices = catalog::find_prices(conn, product.id).await?;
        let option = price_id
            .and_then(|wanted| prices.iter().find(|p| p.price_index == wanted))
            .or_else(|| prices.iter().min_by(|a, b| a.amount.cmp(&b.amount)));
        if let Some(option) = option {
            resolved.amount = option.amount;
            resolved.price_id = Some(option.price_index);
            if !option.name.is_empty() {
                resolved.product_name = format!("{} - {}", product.name, option.name);
            }
        }
    }

    if let Some(amount) = override_amount {
        resolved.amount = amount;
    }
    resolved.amount = money::sanitize_amount(resolved.amount, decimals);
    Ok(resolved)
}

/// Looks up the discount codes a checkout submitted and keeps the ones that
/// may be applied. Unknown, inactive, expired, exhausted and below-minimum
/// codes are skipped. The `none` sentinel yields no discounts at all.
pub async fn load_discounts<C: ConnectionTrait>(
    conn: &C,
    codes: &[String],
    cart_subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<Vec<discount::Model>, ServiceError> {
    let mut valid: Vec<discount::Model> = Vec::new();

    for code in codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if code.eq_ignore_ascii_case(NO_DISCOUNT) {
            return Ok(Vec::new());
        }
        if valid.iter().any(|d| d.code.eq_ignore_ascii_case(code)) {
            continue;
        }

        let Some(found) = catalog::find_discount_by_code(conn, code).await? else {
            warn!(code, "Skipping unknown discount code");
            continue;
        };
        if !found.is_usable(now) {
            warn!(code, discount_id = found.id, "Skipping inactive, expired or exhausted discount");
            continue;
        }
        if cart_subtotal < found.min_charge_amount {
            warn!(code, discount_id = found.id, "Cart is below the discount minimum");
            continue;
        }
        valid.push(found);
    }

    Ok(valid)
}

/// How much each item and each discount ended up taking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountAllocation {
    pub per_item: Vec<Decimal>,
    pub per_discount: Vec<Decimal>,
}

/// Spreads discounts across items.
///
/// Percent discounts apply to each item's subtotal; flat discounts are split
/// in proportion to item subtotals, the last item absorbing rounding. No item
/// is discounted past its subtotal.
pub fn allocate_discounts(
    discounts: &[discount::Model],
    subtotals: &[Decimal],
    decimals: u32,
) -> DiscountAllocation {
    let mut per_item = vec![Decimal::ZERO; subtotals.len()];
    let mut per_discount = Vec::with_capacity(discounts.len());
    let cart_subtotal: Decimal = subtotals.iter().copied().sum();

    for discount in discounts {
        let mut taken = Decimal::ZERO;

        if discount.is_percent() {
            for (i, subtotal) in subtotals.iter().enumerate() {
                let room = *subtotal - per_item[i];
                let share = money::percent_of(*subtotal, discount.amount, decimals).min(room);
                if share > Decimal::ZERO {
                    per_item[i] += share;
                    taken += share;
                }
            }
        } else if cart_subtotal > Decimal::ZERO {
            let amount = discount.amount.min(cart_subtotal);
            let last = subtotals.iter().rposition(|s| *s > Decimal::ZERO);
            let mut allocated = Decimal::ZERO;
            for (i, subtotal) in subtotals.iter().enumerate() {
                if *subtotal <= Decimal::ZERO {
                    continue;
                }
                let proportional = if Some(i) == last {
                    amount - allocated
                } else {
                    money::sanitize_amount(amount * *subtotal / cart_subtotal, decimals)
                        .min(amount - allocated)
                };
                allocated += proportional;
                let share = proportional.min(*subtotal - per_item[i]);
                if share > Decimal::ZERO {
                    per_item[i] += share;
                    taken += share;
                }
            }
        }

        per_discount.push(taken);
    }

    DiscountAllocation {
        per_item,
        per_discount,
    }
}

/// Rate an order is taxed at, or `None` when tax is off or nothing applies.
///
/// A configured rate for the billing (country, region) wins, then the
/// country-wide rate. Otherwise the percent the checkout computed (or the
/// store default) is kept unresolved.
pub async fn resolve_tax_rate<C: ConnectionTrait>(
    conn: &C,
    settings: &StoreSettings,
    address: &AddressInput,
    requested_percent: Option<Decimal>,
) -> Result<Option<TaxRate>, ServiceError> {
    if !settings.tax_enabled {
        return Ok(None);
    }

    if let Some(row) = catalog::find_tax_rate(conn, &address.country, &address.region).await? {
        return Ok(Some(TaxRate::Resolved {
            id: row.id,
            percent: row.rate,
        }));
    }

    let percent = requested_percent.unwrap_or(settings.default_tax_rate);
    if percent > Decimal::ZERO {
        Ok(Some(TaxRate::Unresolved { percent }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn discount(id: i64, amount_type: &str, amount: Decimal) -> discount::Model {
        discount::Model {
            id,
            code: format!("CODE{}", id),
            name: String::new(),
            status: "active".into(),
            amount_type: amount_type.into(),
            amount,
            min_charge_amount: Decimal::ZERO,
            use_count: 0,
            max_uses: 0,
            expires_at: None,
        }
    }

    #[test]
    fn percent_discount_applies_per_item() {
        let alloc = allocate_discounts(
            &[discount(1, "percent", dec!(10))],
            &[dec!(60.00), dec!(40.00)],
            2,
        );
        assert_eq!(alloc.per_item, vec![dec!(6.00), dec!(4.00)]);
        assert_eq!(alloc.per_discount, vec![dec!(10.00)]);
    }

    #[test]
    fn flat_discount_is_split_proportionally() {
        let alloc = allocate_discounts(
            &[discount(1, "flat", dec!(10.00))],
            &[dec!(20.00), dec!(20.00), dec!(20.00)],
            2,
        );
        assert_eq!(alloc.per_item, vec![dec!(3.33), dec!(3.33), dec!(3.34)]);
        assert_eq!(alloc.per_discount, vec![dec!(10.00)]);
    }

    #[test]
    fn discounts_never_exceed_item_subtotals() {
        let alloc = allocate_discounts(
            &[
                discount(1, "percent", dec!(80)),
                discount(2, "flat", dec!(50.00)),
            ],
            &[dec!(10.00), dec!(30.00)],
            2,
        );
        assert_eq!(alloc.per_item, vec![dec!(10.00), dec!(30.00)]);
        assert_eq!(alloc.per_discount, vec![dec!(32.00), dec!(8.00)]);
    }

    #[test]
    fn rounded_shares_never_overshoot_the_discount() {
        // 0.015 per item rounds up to 0.02
        let alloc = allocate_discounts(
            &[discount(1, "flat", dec!(0.05))],
            &[dec!(0.03), dec!(0.03), dec!(0.03), dec!(0.01)],
            2,
        );
        assert_eq!(alloc.per_item, vec![dec!(0.02), dec!(0.02), dec!(0.01), dec!(0)]);
        assert_eq!(alloc.per_discount, vec![dec!(0.05)]);
    }

    #[test]
    fn free_items_take_no_flat_share() {
        let alloc = allocate_discounts(
            &[discount(1, "flat", dec!(5.00))],
            &[dec!(0), dec!(25.00)],
            2,
        );
        assert_eq!(alloc.per_item, vec![dec!(0), dec!(5.00)]);
    }
}
