mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use edd_orders::{
    entities::order,
    errors::ServiceError,
    events::Event,
    models::{AdjustmentType, OrderStatus},
    services::{
        orders::OrderUpdate, Actor, BuildOrderRequest, CreditRequest, RefundLine, RefundPolicy,
        RefundRequest, RefundService, StatusNotifier,
    },
};

use common::{cart_line, cents, checkout, TestApp};

async fn refund_count(app: &TestApp, order_id: i64) -> usize {
    app.state
        .orders
        .get_order_aggregate(order_id)
        .await
        .unwrap()
        .refunds
        .len()
}

async fn first_product(app: &TestApp, order_id: i64) -> edd_orders::entities::product::Model {
    use sea_orm::EntityTrait;

    let items = app.state.orders.get_order_aggregate(order_id).await.unwrap().items;
    edd_orders::entities::product::Entity::find_by_id(items[0].product_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn full_refund_mirrors_every_row() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(100.00)]).await;

    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();

    let refund = app.state.orders.get_order_aggregate(refund_id).await.unwrap();
    assert_eq!(refund.order.parent, sale);
    assert_eq!(refund.order.order_type, "refund");
    assert_eq!(refund.order.status, "complete");
    assert_eq!(cents(refund.order.subtotal), dec!(-100.00));
    assert_eq!(cents(refund.order.tax), dec!(-8.00));
    assert_eq!(cents(refund.order.total), dec!(-108.00));

    let original = app.state.orders.get_order_aggregate(sale).await.unwrap();
    assert_eq!(refund.items.len(), 1);
    assert_eq!(refund.items[0].parent, Some(original.items[0].id));
    assert_eq!(original.items[0].status, "refunded");

    assert_eq!(original.order.status, "refunded");
    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        Decimal::ZERO
    );
    assert!(app.sink.events().contains(&Event::RefundCreated {
        order_id: sale,
        refund_id,
    }));
}

#[tokio::test]
async fn single_item_refund_leaves_order_partially_refunded() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00), dec!(60.00)]).await;
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    let refund_id = app
        .state
        .refunds
        .refund_order(
            &Actor::system(),
            RefundRequest::items(sale, vec![RefundLine::full(items[0].id)]),
        )
        .await
        .unwrap();

    let refund = app.state.orders.get_order(refund_id).await.unwrap().unwrap();
    assert_eq!(cents(refund.total), dec!(-43.20));
    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        dec!(64.80)
    );

    let original = app.state.orders.get_order_aggregate(sale).await.unwrap();
    assert_eq!(original.order.status, "partially_refunded");
    assert_eq!(original.items[0].status, "refunded");
    assert_eq!(original.items[1].status, "complete");
}

#[tokio::test]
async fn refund_numbers_count_up_from_the_parent() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00), dec!(20.00), dec!(30.00)]).await;
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    let mut numbers = Vec::new();
    for item in &items[..2] {
        let refund_id = app
            .state
            .refunds
            .refund_order(
                &Actor::system(),
                RefundRequest::items(sale, vec![RefundLine::full(item.id)]),
            )
            .await
            .unwrap();
        numbers.push(
            app.state
                .orders
                .get_order(refund_id)
                .await
                .unwrap()
                .unwrap()
                .order_number,
        );
    }

    assert_eq!(numbers, vec![format!("{}-R-1", sale), format!("{}-R-2", sale)]);
}

#[tokio::test]
async fn numbered_orders_use_their_number_as_base() {
    let app = TestApp::new().await;
    let ebook = app.seed_product("Ebook", dec!(10.00)).await;
    let sale = app
        .state
        .builder
        .build_order(BuildOrderRequest {
            order_number: Some("EDD-1001".into()),
            status: Some(OrderStatus::Complete),
            cart: vec![cart_line(ebook.id)],
            ..checkout("buyer@example.com")
        })
        .await
        .unwrap();

    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();
    let refund = app.state.orders.get_order(refund_id).await.unwrap().unwrap();
    assert_eq!(refund.order_number, "EDD-1001-R-1");
}

#[tokio::test]
async fn over_refund_is_rejected_without_writes() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00)]).await;
    let item = app.state.orders.get_order_aggregate(sale).await.unwrap().items[0].clone();

    let too_much = RefundLine {
        subtotal: Some(dec!(40.01)),
        ..RefundLine::full(item.id)
    };
    let result = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::items(sale, vec![too_much]))
        .await;
    assert_matches!(result, Err(ServiceError::RefundValidation(_)));

    let exact = RefundLine {
        subtotal: Some(dec!(40.00)),
        tax: Some(dec!(3.20)),
        ..RefundLine::full(item.id)
    };
    assert_eq!(refund_count(&app, sale).await, 0);
    app.state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::items(sale, vec![exact]))
        .await
        .unwrap();

    // nothing is left after the exact refund
    let again = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await;
    assert_matches!(again, Err(ServiceError::NotRefundable(_)));
    assert_eq!(refund_count(&app, sale).await, 1);
}

#[tokio::test]
async fn partial_amounts_accumulate_until_settled() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00)]).await;
    let item = app.state.orders.get_order_aggregate(sale).await.unwrap().items[0].clone();

    let half = RefundLine {
        subtotal: Some(dec!(20.00)),
        tax: Some(dec!(1.60)),
        ..RefundLine::full(item.id)
    };
    for _ in 0..2 {
        app.state
            .refunds
            .refund_order(&Actor::system(), RefundRequest::items(sale, vec![half.clone()]))
            .await
            .unwrap();
    }

    let original = app.state.orders.get_order_aggregate(sale).await.unwrap();
    assert_eq!(original.refunds.len(), 2);
    assert_eq!(original.order.status, "refunded");
    assert_eq!(original.items[0].status, "refunded");

    let third = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::items(sale, vec![half]))
        .await;
    assert_matches!(third, Err(ServiceError::NotRefundable(_)));
}

#[tokio::test]
async fn foreign_and_duplicate_items_are_rejected() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00)]).await;
    let other = app.complete_sale(&[dec!(10.00)]).await;
    let own = app.state.orders.get_order_aggregate(sale).await.unwrap().items[0].id;
    let foreign = app.state.orders.get_order_aggregate(other).await.unwrap().items[0].id;

    for lines in [
        vec![RefundLine::full(foreign)],
        vec![RefundLine::full(own), RefundLine::full(own)],
        vec![],
    ] {
        let result = app
            .state
            .refunds
            .refund_order(&Actor::system(), RefundRequest::items(sale, lines))
            .await;
        assert_matches!(result, Err(ServiceError::RefundValidation(_)));
    }
    assert_eq!(refund_count(&app, sale).await, 0);
}

#[tokio::test]
async fn pending_orders_are_not_refundable() {
    let app = TestApp::new().await;
    let ebook = app.seed_product("Ebook", dec!(10.00)).await;
    let pending = app
        .state
        .builder
        .build_order(BuildOrderRequest {
            cart: vec![cart_line(ebook.id)],
            ..checkout("buyer@example.com")
        })
        .await
        .unwrap();

    let order = app.state.orders.get_order(pending).await.unwrap().unwrap();
    assert!(!app
        .state
        .refunds
        .is_order_refundable(&order, &Actor::system())
        .await
        .unwrap());

    let result = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(pending))
        .await;
    assert_matches!(result, Err(ServiceError::NotRefundable(_)));
}

#[tokio::test]
async fn refund_orders_cannot_be_refunded() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00)]).await;
    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();

    let result = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(refund_id))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOrder(_)));

    let missing = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(9_999))
        .await;
    assert_matches!(missing, Err(ServiceError::InvalidOrder(_)));
}

#[tokio::test]
async fn closed_window_binds_customers_but_not_managers() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00)]).await;

    let order = app.state.orders.get_order(sale).await.unwrap().unwrap();
    assert!(order.date_refundable.is_some());
    assert!(app
        .state
        .refunds
        .is_order_refundable(&order, &Actor::customer(5))
        .await
        .unwrap());

    app.state
        .orders
        .update_order(
            sale,
            OrderUpdate {
                date_refundable: Some(Some(Utc::now() - Duration::days(1))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let customer_result = app
        .state
        .refunds
        .refund_order(&Actor::customer(5), RefundRequest::full(sale))
        .await;
    assert_matches!(customer_result, Err(ServiceError::RefundNotAllowed(_)));

    app.state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();
}

struct BlockedBuyer;

impl RefundPolicy for BlockedBuyer {
    fn allow_refund(&self, order: &order::Model, _actor: &Actor) -> bool {
        order.email != "buyer@example.com"
    }
}

#[tokio::test]
async fn store_policy_can_veto() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00)]).await;

    let notifier = StatusNotifier::new(app.sink.clone(), app.state.config.store.refund_window_days);
    let refunds = RefundService::new(
        app.state.db.clone(),
        app.state.config.store.clone(),
        notifier,
    )
    .with_policy(Arc::new(BlockedBuyer));

    let result = refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await;
    assert_matches!(result, Err(ServiceError::RefundNotAllowed(_)));
    assert_eq!(refund_count(&app, sale).await, 0);
}

#[tokio::test]
async fn item_refund_takes_its_fees() {
    let app = TestApp::new().await;
    let first = app.seed_product("First", dec!(20.00)).await;
    let second = app.seed_product("Second", dec!(30.00)).await;

    let mut line = cart_line(first.id);
    line.fees.push(edd_orders::services::CartFee {
        id: Some("setup".into()),
        label: "Setup".into(),
        amount: dec!(5.00),
        no_tax: true,
    });
    let sale = app
        .state
        .builder
        .build_order(BuildOrderRequest {
            status: Some(OrderStatus::Complete),
            cart: vec![line, cart_line(second.id)],
            ..checkout("buyer@example.com")
        })
        .await
        .unwrap();
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    let refund_id = app
        .state
        .refunds
        .refund_order_item(&Actor::system(), items[0].id)
        .await
        .unwrap();

    let refund = app.state.orders.get_order_aggregate(refund_id).await.unwrap();
    assert_eq!(refund.order.status, "partially_refunded");
    // 20.00 + 1.60 tax + 5.00 setup fee
    assert_eq!(cents(refund.order.total), dec!(-26.60));

    let fee_mirror = refund
        .adjustments
        .iter()
        .find(|a| a.adjustment_type == AdjustmentType::Fee.as_ref())
        .unwrap();
    assert_eq!(fee_mirror.object_type, "order_item");
    assert_eq!(fee_mirror.object_id, refund.items[0].id);
    assert_eq!(fee_mirror.type_key.as_deref(), Some("setup"));

    let original = app.state.orders.get_order(sale).await.unwrap().unwrap();
    assert_eq!(original.status, "partially_refunded");
}

#[tokio::test]
async fn discounts_are_mirrored_when_the_order_settles() {
    let app = TestApp::new().await;
    app.seed_discount("HALF", "percent", dec!(50)).await;
    let ebook = app.seed_product("Ebook", dec!(20.00)).await;
    let sale = app
        .state
        .builder
        .build_order(BuildOrderRequest {
            status: Some(OrderStatus::Complete),
            cart: vec![cart_line(ebook.id)],
            discounts: vec!["HALF".into()],
            ..checkout("buyer@example.com")
        })
        .await
        .unwrap();

    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();
    let refund = app.state.orders.get_order_aggregate(refund_id).await.unwrap();

    assert_eq!(cents(refund.order.discount), dec!(-10.00));
    assert_eq!(cents(refund.order.total), dec!(-10.80));
    let mirror = refund
        .adjustments
        .iter()
        .find(|a| a.adjustment_type == AdjustmentType::Discount.as_ref())
        .unwrap();
    assert_eq!(cents(mirror.total), dec!(-10.00));
    assert!(mirror.parent.is_some());
    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn refunds_leave_notes_and_notify_twice_when_leaving_complete() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(10.00)]).await;
    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();
    let number = app
        .state
        .orders
        .get_order(refund_id)
        .await
        .unwrap()
        .unwrap()
        .order_number;

    let notes: Vec<String> = app
        .state
        .orders
        .get_order_notes(sale)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.content)
        .collect();
    assert!(notes.iter().any(|n| n.starts_with(&format!("Refund {} issued for", number))));
    assert!(notes
        .iter()
        .any(|n| n == "Status changed from complete to refunded"));

    let events = app.sink.events();
    assert!(events.contains(&Event::OrderStatusChanged {
        order_id: sale,
        old_status: "complete".into(),
        new_status: "refunded".into(),
    }));
    assert!(events.contains(&Event::OrderStatusChanged {
        order_id: sale,
        old_status: "publish".into(),
        new_status: "refunded".into(),
    }));
}

#[tokio::test]
async fn refunds_reduce_product_and_customer_stats() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00), dec!(60.00)]).await;
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    app.state
        .refunds
        .refund_order(
            &Actor::system(),
            RefundRequest::items(sale, vec![RefundLine::full(items[0].id)]),
        )
        .await
        .unwrap();

    use edd_orders::entities::{customer, product};
    use sea_orm::EntityTrait;

    let refunded_product = product::Entity::find_by_id(items[0].product_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refunded_product.sales, 0);
    assert_eq!(cents(refunded_product.earnings), Decimal::ZERO);

    let order = app.state.orders.get_order(sale).await.unwrap().unwrap();
    let buyer = customer::Entity::find_by_id(order.customer_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buyer.purchase_count, 1);
    assert_eq!(cents(buyer.purchase_value), dec!(64.80));
}

#[tokio::test]
async fn full_refund_drops_the_sale_from_stats() {
    use edd_orders::entities::customer;
    use sea_orm::EntityTrait;

    let app = TestApp::new().await;
    let kept = app.complete_sale(&[dec!(100.00)]).await;
    let returned = app.complete_sale(&[dec!(50.00)]).await;

    app.state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(returned))
        .await
        .unwrap();

    let refunded_product = first_product(&app, returned).await;
    assert_eq!(refunded_product.sales, 0);
    assert_eq!(cents(refunded_product.earnings), Decimal::ZERO);

    let kept_product = first_product(&app, kept).await;
    assert_eq!(kept_product.sales, 1);
    assert_eq!(cents(kept_product.earnings), dec!(108.00));

    let order = app.state.orders.get_order(kept).await.unwrap().unwrap();
    let buyer = customer::Entity::find_by_id(order.customer_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buyer.purchase_count, 1);
    assert_eq!(cents(buyer.purchase_value), dec!(108.00));
}

#[tokio::test]
async fn full_refund_takes_back_earlier_credits() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(100.00)]).await;

    let credit_id = app
        .state
        .refunds
        .apply_order_credit(
            &Actor::system(),
            sale,
            CreditRequest {
                amount: dec!(10.00),
                description: "Late delivery".into(),
            },
        )
        .await
        .unwrap();
    let credit = app.state.orders.get_order_aggregate(credit_id).await.unwrap().adjustments[0].clone();

    let refund_id = app
        .state
        .refunds
        .refund_order(&Actor::system(), RefundRequest::full(sale))
        .await
        .unwrap();

    let refund = app.state.orders.get_order_aggregate(refund_id).await.unwrap();
    assert_eq!(cents(refund.order.subtotal), dec!(-100.00));
    assert_eq!(cents(refund.order.total), dec!(-98.00));
    let taken_back = refund
        .adjustments
        .iter()
        .find(|a| a.adjustment_type == "credit")
        .unwrap();
    assert_eq!(taken_back.parent, Some(credit.id));
    assert_eq!(cents(taken_back.total), dec!(10.00));

    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        Decimal::ZERO
    );
    let original = app.state.orders.get_order(sale).await.unwrap().unwrap();
    assert_eq!(original.status, "refunded");
}

#[tokio::test]
async fn item_refund_takes_back_the_item_credit() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00), dec!(60.00)]).await;
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    app.state
        .refunds
        .apply_order_item_credit(
            &Actor::system(),
            items[0].id,
            CreditRequest {
                amount: dec!(20.00),
                description: "Damaged file".into(),
            },
        )
        .await
        .unwrap();

    let refund_id = app
        .state
        .refunds
        .refund_order_item(&Actor::system(), items[0].id)
        .await
        .unwrap();

    let refund = app.state.orders.get_order(refund_id).await.unwrap().unwrap();
    assert_eq!(cents(refund.total), dec!(-23.20));
    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        dec!(64.80)
    );
}

#[tokio::test]
async fn refund_beyond_what_credits_left_is_rejected() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00), dec!(60.00)]).await;
    let items = app.state.orders.get_order_aggregate(sale).await.unwrap().items;

    app.state
        .refunds
        .apply_order_credit(
            &Actor::system(),
            sale,
            CreditRequest {
                amount: dec!(100.00),
                description: "Goodwill".into(),
            },
        )
        .await
        .unwrap();

    // 8.00 left, the item is worth 43.20
    let result = app
        .state
        .refunds
        .refund_order(
            &Actor::system(),
            RefundRequest::items(sale, vec![RefundLine::full(items[0].id)]),
        )
        .await;
    assert_matches!(result, Err(ServiceError::RefundValidation(_)));
    assert_eq!(refund_count(&app, sale).await, 1);
    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        dec!(8.00)
    );
}

#[tokio::test]
async fn credit_beyond_total_is_rejected() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(100.00)]).await;

    let result = app
        .state
        .refunds
        .apply_order_credit(
            &Actor::system(),
            sale,
            CreditRequest {
                amount: dec!(200.00),
                description: "Goodwill".into(),
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidCredit(_)));

    let zero = app
        .state
        .refunds
        .apply_order_credit(
            &Actor::system(),
            sale,
            CreditRequest {
                amount: Decimal::ZERO,
                description: String::new(),
            },
        )
        .await;
    assert_matches!(zero, Err(ServiceError::InvalidCredit(_)));
    assert_eq!(refund_count(&app, sale).await, 0);
}

#[tokio::test]
async fn credit_reduces_net_total_without_touching_status() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(100.00)]).await;

    let credit_id = app
        .state
        .refunds
        .apply_order_credit(
            &Actor::system(),
            sale,
            CreditRequest {
                amount: dec!(10.00),
                description: "Late delivery".into(),
            },
        )
        .await
        .unwrap();

    let credit = app.state.orders.get_order_aggregate(credit_id).await.unwrap();
    assert_eq!(credit.order.order_type, "refund");
    assert_eq!(cents(credit.order.total), dec!(-10.00));
    assert_eq!(credit.adjustments.len(), 1);
    assert_eq!(credit.adjustments[0].adjustment_type, "credit");
    assert_eq!(credit.adjustments[0].description, "Late delivery");

    assert_eq!(
        cents(app.state.orders.get_order_total(sale).await.unwrap()),
        dec!(98.00)
    );
    let original = app.state.orders.get_order(sale).await.unwrap().unwrap();
    assert_eq!(original.status, "complete");
}

#[tokio::test]
async fn item_credit_is_bounded_by_the_item() {
    let app = TestApp::new().await;
    let sale = app.complete_sale(&[dec!(40.00), dec!(60.00)]).await;
    let item = app.state.orders.get_order_aggregate(sale).await.unwrap().items[0].clone();

    let credit = |amount| CreditRequest {
        amount,
        description: "Partial credit".into(),
    };

    let too_much = app
        .state
        .refunds
        .apply_order_item_credit(&Actor::system(), item.id, credit(dec!(50.00)))
        .await;
    assert_matches!(too_much, Err(ServiceError::InvalidCredit(_)));

    let credit_id = app
        .state
        .refunds
        .apply_order_item_credit(&Actor::system(), item.id, credit(dec!(20.00)))
        .await
        .unwrap();
    let credit_row = app.state.orders.get_order_aggregate(credit_id).await.unwrap();
    assert_eq!(
        credit_row.adjustments[0].type_key,
        Some(format!("order_item-{}", item.id))
    );

    // 23.20 left on the item
    let second = app
        .state
        .refunds
        .apply_order_item_credit(&Actor::system(), item.id, credit(dec!(30.00)))
        .await;
    assert_matches!(second, Err(ServiceError::InvalidCredit(_)));
    assert_eq!(refund_count(&app, sale).await, 1);
}
