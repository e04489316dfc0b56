use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DbErr};
use std::collections::HashSet;

use crate::entities::{order, order_adjustment, order_item};
use crate::errors::ServiceError;
use crate::models::{money, AdjustmentType, ObjectType};
use crate::repositories::orders as repo;

/// One row to refund. Missing amounts default to everything still
/// refundable on the row, or a quantity-proportional share of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundLine {
    pub id: i64,
    pub quantity: Option<i32>,
    pub subtotal: Option<Decimal>,
    pub tax: Option<Decimal>,
}

impl RefundLine {
    pub fn full(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Which items (or fees) a refund covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundScope {
    /// Every row with something left to refund
    All,
    Lines(Vec<RefundLine>),
}

impl RefundScope {
    pub fn none() -> Self {
        Self::Lines(Vec::new())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::Lines(lines) if lines.is_empty())
    }
}

/// What is left of an original row after the refunds already issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Remaining {
    pub quantity: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Remaining {
    fn is_settled(&self) -> bool {
        self.subtotal.is_zero() && self.tax.is_zero()
    }
}

/// Positive amounts to mirror for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedItem {
    pub original: order_item::Model,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Nothing is left to refund on the item afterwards
    pub settles: bool,
}

/// Amounts to mirror for one fee, in the fee's own sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFee {
    pub original: order_adjustment::Model,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRefund {
    pub items: Vec<ValidatedItem>,
    pub fees: Vec<ValidatedFee>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Every item and fee of the order is fully refunded afterwards
    pub settles_order: bool,
}

/// A credit issued against the order that no later refund has taken back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingCredit {
    pub credit: order_adjustment::Model,
    /// Item the credit was issued against, when it was item scoped
    pub item_id: Option<i64>,
    /// Positive
    pub amount: Decimal,
}

/// Key stored on a credit issued against a single item.
pub fn item_credit_key(item_id: i64) -> String {
    format!("{}{}", ITEM_CREDIT_PREFIX, item_id)
}

const ITEM_CREDIT_PREFIX: &str = "order_item-";

fn credited_item(key: Option<&str>) -> Option<i64> {
    key?.strip_prefix(ITEM_CREDIT_PREFIX)?.parse().ok()
}

/// Checks a refund request against what the order still has to give back.
///
/// Holds the original rows and every mirror row issued by earlier refunds,
/// so validation itself never touches the store.
#[derive(Debug, Clone)]
pub struct RefundValidator {
    decimals: u32,
    items: Vec<order_item::Model>,
    fees: Vec<order_adjustment::Model>,
    discounts: Vec<order_adjustment::Model>,
    prior_items: Vec<order_item::Model>,
    prior_adjustments: Vec<order_adjustment::Model>,
}

impl RefundValidator {
    pub fn new(
        decimals: u32,
        items: Vec<order_item::Model>,
        adjustments: Vec<order_adjustment::Model>,
        prior_items: Vec<order_item::Model>,
        prior_adjustments: Vec<order_adjustment::Model>,
    ) -> Self {
        let (fees, discounts): (Vec<_>, Vec<_>) = adjustments
            .into_iter()
            .filter(|a| {
                a.adjustment_type == AdjustmentType::Fee.as_ref()
                    || (a.adjustment_type == AdjustmentType::Discount.as_ref()
                        && a.object_type == ObjectType::Order.as_ref())
            })
            .partition(|a| a.adjustment_type == AdjustmentType::Fee.as_ref());

        Self {
            decimals,
            items,
            fees,
            discounts,
            prior_items,
            prior_adjustments,
        }
    }

    /// Loads the order's rows and the mirrors recorded on its refunds.
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        order: &order::Model,
        decimals: u32,
    ) -> Result<Self, DbErr> {
        let items = repo::find_items(conn, order.id).await?;
        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let adjustments = repo::find_adjustments(conn, order.id, &item_ids).await?;

        let mut prior_items = Vec::new();
        let mut prior_adjustments = Vec::new();
        for refund in repo::find_refunds(conn, order.id).await? {
            let mirrors = repo::find_items(conn, refund.id).await?;
            let mirror_ids: Vec<i64> = mirrors.iter().map(|i| i.id).collect();
            prior_adjustments.extend(repo::find_adjustments(conn, refund.id, &mirror_ids).await?);
            prior_items.extend(mirrors);
        }

        Ok(Self::new(
            decimals,
            items,
            adjustments,
            prior_items,
            prior_adjustments,
        ))
    }

    pub fn items(&self) -> &[order_item::Model] {
        &self.items
    }

    pub fn fees(&self) -> &[order_adjustment::Model] {
        &self.fees
    }

    pub fn remaining_item(&self, item: &order_item::Model) -> Remaining {
        let mut remaining = Remaining {
            quantity: item.quantity,
            subtotal: item.subtotal,
            discount: item.discount,
            tax: item.tax,
            total: item.total,
        };
        for mirror in self.prior_items.iter().filter(|m| m.parent == Some(item.id)) {
            remaining.quantity -= mirror.quantity;
            remaining.subtotal += mirror.subtotal;
            remaining.discount += mirror.discount;
            remaining.tax += mirror.tax;
            remaining.total += mirror.total;
        }
        remaining.quantity = remaining.quantity.max(0);
        remaining
    }

    pub fn remaining_adjustment(&self, adjustment: &order_adjustment::Model) -> Remaining {
        let mut remaining = Remaining {
            quantity: 0,
            subtotal: adjustment.subtotal,
            discount: Decimal::ZERO,
            tax: adjustment.tax,
            total: adjustment.total,
        };
        for mirror in self
            .prior_adjustments
            .iter()
            .filter(|m| m.parent == Some(adjustment.id))
        {
            remaining.subtotal += mirror.subtotal;
            remaining.tax += mirror.tax;
            remaining.total += mirror.total;
        }
        remaining
    }

    /// Fee lines covering everything left on the fees attached to `item_id`.
    pub fn item_fee_lines(&self, item_id: i64) -> Vec<RefundLine> {
        self.fees
            .iter()
            .filter(|f| f.object_type == ObjectType::OrderItem.as_ref() && f.object_id == item_id)
            .filter(|f| !self.remaining_adjustment(f).is_settled())
            .map(|f| RefundLine::full(f.id))
            .collect()
    }

    /// Credits already paid out on earlier refund orders. A refund that
    /// settles the order (or the credited item) takes these back so the
    /// buyer is never returned more than they paid.
    pub fn outstanding_credits(&self) -> Vec<OutstandingCredit> {
        let is_credit = |a: &&order_adjustment::Model| {
            a.adjustment_type == AdjustmentType::Credit.as_ref()
        };
        self.prior_adjustments
            .iter()
            .filter(is_credit)
            .filter(|a| a.parent.is_none())
            .filter_map(|credit| {
                let taken_back: Decimal = self
                    .prior_adjustments
                    .iter()
                    .filter(is_credit)
                    .filter(|m| m.parent == Some(credit.id))
                    .map(|m| m.total)
                    .sum();
                let amount = -(credit.total + taken_back);
                (amount > Decimal::ZERO).then(|| OutstandingCredit {
                    item_id: credited_item(credit.type_key.as_deref()),
                    credit: credit.clone(),
                    amount,
                })
            })
            .collect()
    }

    /// Order-level discount adjustments paired with what is left to mirror.
    pub fn unsettled_discounts(&self) -> Vec<(order_adjustment::Model, Remaining)> {
        self.discounts
            .iter()
            .map(|d| (d.clone(), self.remaining_adjustment(d)))
            .filter(|(_, r)| !r.total.is_zero())
            .collect()
    }

    pub fn validate(
        &self,
        items: &RefundScope,
        fees: &RefundScope,
    ) -> Result<ValidatedRefund, ServiceError> {
        if items.is_none() && fees.is_none() {
            return Err(ServiceError::RefundValidation(
                "nothing was selected for refund".to_string(),
            ));
        }

        let item_lines = match items {
            RefundScope::All => self
                .items
                .iter()
                .filter(|i| {
                    let r = self.remaining_item(i);
                    r.subtotal > Decimal::ZERO || r.tax > Decimal::ZERO
                })
                .map(|i| RefundLine::full(i.id))
                .collect(),
            RefundScope::Lines(lines) => lines.clone(),
        };
        let fee_lines = match fees {
            RefundScope::All => self
                .fees
                .iter()
                .filter(|f| !self.remaining_adjustment(f).is_settled())
                .map(|f| RefundLine::full(f.id))
                .collect(),
            RefundScope::Lines(lines) => lines.clone(),
        };

        let mut seen = HashSet::new();
        let mut validated_items = Vec::with_capacity(item_lines.len());
        for line in &item_lines {
            if !seen.insert(line.id) {
                return Err(ServiceError::RefundValidation(format!(
                    "order item {} is listed more than once",
                    line.id
                )));
            }
            validated_items.push(self.validate_item(line)?);
        }

        seen.clear();
        let mut validated_fees = Vec::with_capacity(fee_lines.len());
        for line in &fee_lines {
            if !seen.insert(line.id) {
                return Err(ServiceError::RefundValidation(format!(
                    "fee {} is listed more than once",
                    line.id
                )));
            }
            validated_fees.push(self.validate_fee(line)?);
        }

        if validated_items.is_empty() && validated_fees.is_empty() {
            return Err(ServiceError::RefundValidation(
                "nothing is left to refund".to_string(),
            ));
        }

        let subtotal: Decimal = validated_items.iter().map(|i| i.subtotal).sum::<Decimal>()
            + validated_fees.iter().map(|f| f.subtotal).sum::<Decimal>();
        let discount: Decimal = validated_items.iter().map(|i| i.discount).sum();
        let tax: Decimal = validated_items.iter().map(|i| i.tax).sum::<Decimal>()
            + validated_fees.iter().map(|f| f.tax).sum::<Decimal>();

        let settles_order = self.items.iter().all(|item| {
            validated_items
                .iter()
                .find(|v| v.original.id == item.id)
                .map_or_else(|| self.remaining_item(item).is_settled(), |v| v.settles)
        }) && self.fees.iter().all(|fee| {
            validated_fees
                .iter()
                .find(|v| v.original.id == fee.id)
                .map_or_else(
                    || self.remaining_adjustment(fee).is_settled(),
                    |v| {
                        let r = self.remaining_adjustment(fee);
                        v.subtotal == r.subtotal && v.tax == r.tax
                    },
                )
        });

        Ok(ValidatedRefund {
            items: validated_items,
            fees: validated_fees,
            subtotal: money::sanitize_amount(subtotal, self.decimals),
            discount: money::sanitize_amount(discount, self.decimals),
            tax: money::sanitize_amount(tax, self.decimals),
            total: money::sanitize_amount(subtotal - discount + tax, self.decimals),
            settles_order,
        })
    }

    fn validate_item(&self, line: &RefundLine) -> Result<ValidatedItem, ServiceError> {
        let item = self
            .items
            .iter()
            .find(|i| i.id == line.id)
            .ok_or_else(|| {
                ServiceError::RefundValidation(format!(
                    "order item {} does not belong to this order",
                    line.id
                ))
            })?;
        let remaining = self.remaining_item(item);
        if remaining.is_settled() {
            return Err(ServiceError::RefundValidation(format!(
                "order item {} has already been refunded",
                item.id
            )));
        }

        let whole = remaining.quantity.max(1);
        let quantity = line.quantity.unwrap_or(whole);
        if quantity < 1 || quantity > whole {
            return Err(ServiceError::RefundValidation(format!(
                "quantity {} for order item {} must be between 1 and {}",
                quantity, item.id, whole
            )));
        }

        let share = |amount: Decimal| {
            if quantity == whole {
                amount
            } else {
                money::sanitize_amount(
                    amount * Decimal::from(quantity) / Decimal::from(whole),
                    self.decimals,
                )
            }
        };
        let subtotal = money::sanitize_amount(
            line.subtotal.unwrap_or_else(|| share(remaining.subtotal)),
            self.decimals,
        );
        let tax = money::sanitize_amount(
            line.tax.unwrap_or_else(|| share(remaining.tax)),
            self.decimals,
        );

        if !within(subtotal, remaining.subtotal) {
            return Err(ServiceError::RefundValidation(format!(
                "subtotal {} for order item {} exceeds the refundable {}",
                subtotal, item.id, remaining.subtotal
            )));
        }
        if !within(tax, remaining.tax) {
            return Err(ServiceError::RefundValidation(format!(
                "tax {} for order item {} exceeds the refundable {}",
                tax, item.id, remaining.tax
            )));
        }
        if subtotal.is_zero() && tax.is_zero() {
            return Err(ServiceError::RefundValidation(format!(
                "refund for order item {} is zero",
                item.id
            )));
        }

        let settles = subtotal == remaining.subtotal && tax == remaining.tax;
        let discount = if settles {
            remaining.discount
        } else if item.subtotal > Decimal::ZERO {
            money::sanitize_amount(item.discount * subtotal / item.subtotal, self.decimals)
                .min(remaining.discount)
        } else {
            Decimal::ZERO
        };

        Ok(ValidatedItem {
            original: item.clone(),
            quantity,
            subtotal,
            discount,
            tax,
            total: money::sanitize_amount(subtotal - discount + tax, self.decimals),
            settles,
        })
    }

    fn validate_fee(&self, line: &RefundLine) -> Result<ValidatedFee, ServiceError> {
        let fee = self.fees.iter().find(|f| f.id == line.id).ok_or_else(|| {
            ServiceError::RefundValidation(format!("fee {} does not belong to this order", line.id))
        })?;
        let remaining = self.remaining_adjustment(fee);
        if remaining.is_settled() {
            return Err(ServiceError::RefundValidation(format!(
                "fee {} has already been refunded",
                fee.id
            )));
        }

        let subtotal =
            money::sanitize_amount(line.subtotal.unwrap_or(remaining.subtotal), self.decimals);
        let tax = money::sanitize_amount(line.tax.unwrap_or(remaining.tax), self.decimals);
        if !within(subtotal, remaining.subtotal) || !within(tax, remaining.tax) {
            return Err(ServiceError::RefundValidation(format!(
                "refund for fee {} exceeds the refundable {}",
                fee.id, remaining.total
            )));
        }

        Ok(ValidatedFee {
            original: fee.clone(),
            subtotal,
            tax,
            total: money::sanitize_amount(subtotal + tax, self.decimals),
        })
    }
}

/// `requested` lies between zero and `remaining`, on the same side of zero.
fn within(requested: Decimal, remaining: Decimal) -> bool {
    if remaining >= Decimal::ZERO {
        requested >= Decimal::ZERO && requested <= remaining
    } else {
        requested <= Decimal::ZERO && requested >= remaining
    }
}
