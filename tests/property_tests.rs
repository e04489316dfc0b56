//! Property-based tests for the ledger arithmetic.
//!
//! These run the pure pieces (discount allocation, totals, refund numbering,
//! refund bounds) over generated inputs without touching a database.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use edd_orders::{
    entities::{discount, order_adjustment, order_item},
    models::money,
    repositories::orders::sum_totals,
    services::{
        order_number::next_refund_number,
        pricing::allocate_discounts,
        refund_validator::{RefundLine, RefundScope, RefundValidator},
    },
};

// Strategies for generating test data
fn cents_strategy(max: i64) -> impl Strategy<Value = Decimal> {
    (0..=max).prop_map(|c| Decimal::new(c, 2))
}

fn subtotals_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(cents_strategy(50_000), 1..8)
}

fn discount_strategy() -> impl Strategy<Value = discount::Model> {
    (
        prop_oneof![Just("percent"), Just("flat")],
        1i64..20_000,
    )
        .prop_map(|(kind, raw)| {
            let amount = if kind == "percent" {
                Decimal::new(raw % 10_000, 2)
            } else {
                Decimal::new(raw, 2)
            };
            discount::Model {
                id: raw,
                code: format!("CODE{}", raw),
                name: String::new(),
                status: "active".into(),
                amount_type: kind.into(),
                amount,
                min_charge_amount: Decimal::ZERO,
                use_count: 0,
                max_uses: 0,
                expires_at: None,
            }
        })
}

fn item(id: i64, subtotal: Decimal, tax: Decimal) -> order_item::Model {
    let now = Utc::now();
    order_item::Model {
        id,
        parent: None,
        order_id: 1,
        product_id: id,
        product_name: format!("Product {}", id),
        price_id: None,
        cart_index: id as i32,
        status: "complete".into(),
        quantity: 1,
        amount: subtotal,
        subtotal,
        discount: Decimal::ZERO,
        tax,
        total: subtotal + tax,
        date_created: now,
        date_modified: now,
    }
}

fn fee(id: i64, subtotal: Decimal) -> order_adjustment::Model {
    let now = Utc::now();
    order_adjustment::Model {
        id,
        parent: None,
        object_id: 1,
        object_type: "order".into(),
        adjustment_type: "fee".into(),
        type_id: None,
        type_key: Some(format!("fee-{}", id)),
        description: "Fee".into(),
        subtotal,
        tax: Decimal::ZERO,
        total: subtotal,
        date_created: now,
        date_modified: now,
    }
}

// Property: discounts never push an item below zero
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn allocation_never_exceeds_item_subtotals(
        subtotals in subtotals_strategy(),
        discounts in prop::collection::vec(discount_strategy(), 0..4),
    ) {
        let allocation = allocate_discounts(&discounts, &subtotals, 2);

        prop_assert_eq!(allocation.per_item.len(), subtotals.len());
        prop_assert_eq!(allocation.per_discount.len(), discounts.len());
        for (taken, subtotal) in allocation.per_item.iter().zip(&subtotals) {
            prop_assert!(*taken >= Decimal::ZERO);
            prop_assert!(taken <= subtotal, "took {} of {}", taken, subtotal);
        }

        let by_item: Decimal = allocation.per_item.iter().copied().sum();
        let by_discount: Decimal = allocation.per_discount.iter().copied().sum();
        prop_assert_eq!(by_item, by_discount);
    }

    #[test]
    fn flat_discount_takes_at_most_its_amount(
        subtotals in subtotals_strategy(),
        discount in discount_strategy().prop_filter("flat", |d| !d.is_percent()),
    ) {
        let cart: Decimal = subtotals.iter().copied().sum();
        let allocation = allocate_discounts(std::slice::from_ref(&discount), &subtotals, 2);
        prop_assert!(allocation.per_discount[0] <= discount.amount.min(cart));
    }
}

// Property: header totals are always derived the same way
proptest! {
    #[test]
    fn totals_add_up(
        lines in prop::collection::vec((cents_strategy(20_000), cents_strategy(2_000)), 0..6),
        fees in prop::collection::vec(cents_strategy(5_000), 0..3),
    ) {
        let items: Vec<_> = lines
            .iter()
            .enumerate()
            .map(|(i, (subtotal, tax))| item(i as i64 + 1, *subtotal, *tax))
            .collect();
        let adjustments: Vec<_> = fees
            .iter()
            .enumerate()
            .map(|(i, amount)| fee(i as i64 + 1, *amount))
            .collect();

        let totals = sum_totals(&items, &adjustments, 2);
        let fee_total: Decimal = fees.iter().copied().sum();
        prop_assert_eq!(totals.total, totals.subtotal - totals.discount + totals.tax + fee_total);
        prop_assert_eq!(totals.total, money::sanitize_amount(totals.total, 2));
    }
}

// Property: refund numbers keep counting up
proptest! {
    #[test]
    fn refund_numbers_are_sequential(base in "[A-Z]{0,4}[0-9]{1,6}", count in 0usize..12) {
        let mut existing: Vec<String> = Vec::new();
        for n in 1..=count {
            let next = next_refund_number(&base, "-R-", &existing);
            prop_assert_eq!(&next, &format!("{}-R-{}", base, n));
            prop_assert!(!existing.contains(&next));
            existing.push(next);
        }
    }
}

// Property: the validator accepts exactly the amounts still refundable
proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn item_refund_bounds(
        subtotal in cents_strategy(50_000),
        tax in cents_strategy(5_000),
        requested in cents_strategy(100_000),
    ) {
        let validator = RefundValidator::new(2, vec![item(1, subtotal, tax)], Vec::new(), Vec::new(), Vec::new());
        let line = RefundLine {
            subtotal: Some(requested),
            ..RefundLine::full(1)
        };
        let result = validator.validate(&RefundScope::Lines(vec![line]), &RefundScope::none());

        let refundable = !(subtotal.is_zero() && tax.is_zero());
        let expect_ok = refundable && requested <= subtotal && !(requested.is_zero() && tax.is_zero());
        prop_assert_eq!(result.is_ok(), expect_ok, "subtotal {} tax {} requested {}", subtotal, tax, requested);

        if let Ok(validated) = result {
            prop_assert_eq!(validated.total, requested + tax);
            prop_assert_eq!(validated.settles_order, requested == subtotal);
        }
    }
}
