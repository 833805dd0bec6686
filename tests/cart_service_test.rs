//! Cart store behavior: line merging, stock gating, derived totals and
//! TTL expiry.

mod common;

use common::TestApp;
use marketplace_checkout::{errors::ServiceError, services::cart::AddItemInput};
use uuid::Uuid;

fn add(product_id: Uuid, variant_id: Option<Uuid>, quantity: i32) -> AddItemInput {
    AddItemInput {
        product_id,
        variant_id,
        quantity,
    }
}

#[tokio::test]
async fn adding_same_product_twice_merges_into_one_line() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Widget", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    app.state
        .cart_service
        .add_item(user_id, add(product.id, None, 2))
        .await
        .unwrap();
    let cart = app
        .state
        .cart_service
        .add_item(user_id, add(product.id, None, 3))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.items[0].line_total, 5_000);
    assert_eq!(cart.totals.subtotal, 5_000);
}

#[tokio::test]
async fn variants_of_same_product_are_separate_lines() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Shirt", 2_000, 10).await;
    let variant = app.seed_variant(&product, "SHIRT-XL", 2_500, 10).await;
    let user_id = Uuid::new_v4();

    app.state
        .cart_service
        .add_item(user_id, add(product.id, None, 1))
        .await
        .unwrap();
    let cart = app
        .state
        .cart_service
        .add_item(user_id, add(product.id, Some(variant.id), 1))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 2);
    // variant price overrides the product price
    let variant_line = cart
        .items
        .iter()
        .find(|i| i.variant_id == Some(variant.id))
        .unwrap();
    assert_eq!(variant_line.unit_price, 2_500);
}

#[tokio::test]
async fn insufficient_stock_leaves_cart_unchanged() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Rare item", 1_000, 3).await;
    let user_id = Uuid::new_v4();

    app.state
        .cart_service
        .add_item(user_id, add(product.id, None, 2))
        .await
        .unwrap();

    // 2 already in cart + 2 more would exceed the 3 in stock
    let err = app
        .state
        .cart_service
        .add_item(user_id, add(product.id, None, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let cart = app.state.cart_service.get_cart(user_id);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn update_to_zero_quantity_removes_the_line() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Widget", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    let cart = app
        .state
        .cart_service
        .add_item(user_id, add(product.id, None, 2))
        .await
        .unwrap();
    let item_id = cart.items[0].id;

    let cart = app
        .state
        .cart_service
        .update_item(user_id, item_id, 0)
        .await
        .unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.totals.subtotal, 0);
    assert_eq!(cart.totals.total, 0);
}

#[tokio::test]
async fn update_quantity_recomputes_totals() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Widget", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    let cart = app
        .state
        .cart_service
        .add_item(user_id, add(product.id, None, 1))
        .await
        .unwrap();
    let item_id = cart.items[0].id;

    let cart = app
        .state
        .cart_service
        .update_item(user_id, item_id, 4)
        .await
        .unwrap();
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(cart.totals.subtotal, 4_000);
    assert_eq!(
        cart.totals.total,
        cart.totals.subtotal + cart.totals.shipping + cart.totals.tax
    );
}

#[tokio::test]
async fn shipping_waived_above_free_shipping_threshold() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let cheap = app.seed_product(&vendor, "Cheap", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    let cart = app
        .state
        .cart_service
        .add_item(user_id, add(cheap.id, None, 1))
        .await
        .unwrap();
    assert_eq!(cart.totals.shipping, 500);

    // push the vendor group over the 50_000 default threshold
    let cart = app
        .state
        .cart_service
        .update_item(user_id, cart.items[0].id, 50)
        .await
        .unwrap();
    assert_eq!(cart.totals.shipping, 0);
}

#[tokio::test]
async fn expired_cart_reads_as_empty() {
    let app = TestApp::new_with(|cfg| cfg.checkout.cart_ttl_secs = 0).await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Widget", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    app.state
        .cart_service
        .add_item(user_id, add(product.id, None, 1))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let cart = app.state.cart_service.get_cart(user_id);
    assert!(cart.is_empty());
}

#[tokio::test]
async fn clear_drops_the_cart() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Widget", 1_000, 10).await;
    let user_id = Uuid::new_v4();

    app.state
        .cart_service
        .add_item(user_id, add(product.id, None, 1))
        .await
        .unwrap();
    app.state.cart_service.clear(user_id);

    assert!(app.state.cart_service.get_cart(user_id).is_empty());
}

#[tokio::test]
async fn inactive_product_cannot_be_added() {
    let app = TestApp::new().await;
    let vendor = app.seed_vendor("Acme").await;
    let product = app.seed_product(&vendor, "Ghost", 1_000, 10).await;

    use marketplace_checkout::entities::product;
    use sea_orm::{ActiveModelTrait, Set};
    let mut active: product::ActiveModel = product.clone().into();
    active.is_active = Set(false);
    active.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .cart_service
        .add_item(Uuid::new_v4(), add(product.id, None, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}
