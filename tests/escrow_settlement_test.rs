//! Escrow ledger transitions, balance conservation and the
//! delivery/cancellation settlement entry points.

mod common;

use common::{checkout_request, TestApp};
use marketplace_checkout::{
    entities::{
        escrow_ledger::{self, EscrowStatus},
        order::OrderStatus,
        EscrowLedgerModel,
    },
    errors::ServiceError,
    gateways::WalletLedger,
    services::{cart::AddItemInput, checkout::PaymentMethod},
};
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Wallet checkout of one product; returns (app, user, order_id,
/// escrow).
async fn checked_out_escrow(price: i64, quantity: i32) -> (TestApp, Uuid, Uuid, EscrowLedgerModel) {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Lamp", price, 50).await;

    let user_id = Uuid::new_v4();
    app.wallet.credit(user_id, 10_000_000).await.unwrap();
    app.state
        .cart_service
        .add_item(
            user_id,
            AddItemInput {
                product_id: product.id,
                variant_id: None,
                quantity,
            },
        )
        .await
        .unwrap();

    let outcome = app
        .state
        .checkout_service
        .checkout(user_id, checkout_request(PaymentMethod::Wallet))
        .await
        .unwrap();
    let order_id = outcome.orders[0].order_id;
    let escrow = app.state.escrow_service.get_by_order(order_id).await.unwrap();
    (app, user_id, order_id, escrow)
}

#[tokio::test]
async fn release_moves_the_full_remaining_balance() {
    let (app, _, _, escrow) = checked_out_escrow(5_000, 1).await;
    assert_eq!(escrow.status, EscrowStatus::Held);
    assert_eq!(escrow.amount_released, 0);

    let released = app
        .state
        .escrow_service
        .release(escrow.id, "delivery confirmed")
        .await
        .unwrap();

    assert_eq!(released.status, EscrowStatus::Released);
    assert_eq!(released.amount_released, escrow.amount_held);
    assert_eq!(released.amount_refunded, 0);
    assert_eq!(released.status_reason.as_deref(), Some("delivery confirmed"));
}

#[tokio::test]
async fn refund_is_symmetric_to_release() {
    let (app, _, _, escrow) = checked_out_escrow(5_000, 1).await;

    let refunded = app
        .state
        .escrow_service
        .refund(escrow.id, "order cancelled")
        .await
        .unwrap();

    assert_eq!(refunded.status, EscrowStatus::Refunded);
    assert_eq!(refunded.amount_refunded, escrow.amount_held);
    assert_eq!(refunded.amount_released, 0);
}

#[tokio::test]
async fn settled_escrow_rejects_further_transitions() {
    let (app, _, _, escrow) = checked_out_escrow(5_000, 1).await;

    app.state
        .escrow_service
        .release(escrow.id, "delivered")
        .await
        .unwrap();

    for result in [
        app.state.escrow_service.release(escrow.id, "again").await,
        app.state.escrow_service.refund(escrow.id, "never").await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "got {:?}", err);
    }

    // conservation: amounts unchanged by the rejected calls
    let after = app.state.escrow_service.get(escrow.id).await.unwrap();
    assert_eq!(after.amount_released, escrow.amount_held);
    assert_eq!(after.amount_refunded, 0);
    assert!(after.amount_released + after.amount_refunded <= after.amount_held);
}

#[tokio::test]
async fn unknown_escrow_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .state
        .escrow_service
        .release(Uuid::new_v4(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn dispute_annotates_without_touching_amounts() {
    let (app, _, _, escrow) = checked_out_escrow(5_000, 1).await;
    let dispute_id = Uuid::new_v4();

    let disputed = app
        .state
        .escrow_service
        .attach_dispute(escrow.id, dispute_id)
        .await
        .unwrap();

    assert_eq!(disputed.dispute_id, Some(dispute_id));
    assert_eq!(disputed.status, EscrowStatus::Held);
    assert_eq!(disputed.amount_held, escrow.amount_held);
    assert_eq!(disputed.amount_released, 0);
    assert_eq!(disputed.amount_refunded, 0);

    // a disputed ledger can still settle
    app.state
        .escrow_service
        .refund(escrow.id, "dispute resolved for buyer")
        .await
        .unwrap();
}

#[tokio::test]
async fn corrupted_balances_trip_the_invariant_guard() {
    let (app, _, _, escrow) = checked_out_escrow(5_000, 1).await;

    // simulate a buggy writer: released exceeds held while still Held
    let mut active: escrow_ledger::ActiveModel =
        app.state.escrow_service.get(escrow.id).await.unwrap().into();
    active.amount_released = Set(escrow.amount_held + 1);
    active.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .escrow_service
        .release(escrow.id, "should not work")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvariantViolation(_)));
}

#[tokio::test]
async fn delivery_confirmation_releases_escrow_and_marks_order() {
    let (app, _, order_id, escrow) = checked_out_escrow(5_000, 1).await;

    let order = app
        .state
        .settlement_service
        .confirm_delivery(order_id, "courier scan")
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Delivered);
    let ledger = app.state.escrow_service.get(escrow.id).await.unwrap();
    assert_eq!(ledger.status, EscrowStatus::Released);

    // a delivered order cannot be delivered or cancelled again
    let err = app
        .state
        .settlement_service
        .confirm_delivery(order_id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let err = app
        .state
        .settlement_service
        .cancel_order(order_id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn cancellation_refunds_escrow_and_restocks() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Lamp", 5_000, 10).await;

    let user_id = Uuid::new_v4();
    app.wallet.credit(user_id, 100_000).await.unwrap();
    app.state
        .cart_service
        .add_item(
            user_id,
            AddItemInput {
                product_id: product.id,
                variant_id: None,
                quantity: 4,
            },
        )
        .await
        .unwrap();
    let outcome = app
        .state
        .checkout_service
        .checkout(user_id, checkout_request(PaymentMethod::Wallet))
        .await
        .unwrap();
    let order_id = outcome.orders[0].order_id;
    assert_eq!(
        app.state
            .inventory_service
            .available(product.id, None)
            .await
            .unwrap(),
        6
    );

    let order = app
        .state
        .settlement_service
        .cancel_order(order_id, "buyer request")
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    let ledger = app.state.escrow_service.get_by_order(order_id).await.unwrap();
    assert_eq!(ledger.status, EscrowStatus::Refunded);
    assert_eq!(ledger.amount_refunded, ledger.amount_held);
    assert_eq!(
        app.state
            .inventory_service
            .available(product.id, None)
            .await
            .unwrap(),
        10
    );
}
