//! Test harness: application state over an in-memory SQLite database
//! with a fake payment gateway and a seedable wallet.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use marketplace_checkout::{
    config::AppConfig,
    db,
    entities::{product, product_variant, vendor, ProductModel, ProductVariantModel, VendorModel},
    errors::ServiceError,
    events::Event,
    gateways::{
        InMemoryWalletLedger, InitializePayment, PaymentGateway, PaymentInitiation,
        PaymentVerification, PaymentVerificationStatus,
    },
    AppState,
};
use sea_orm::{ActiveModelTrait, Set};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Gateway double. Records the last initialization and verifies
/// against it; can be flipped into failure mode.
#[derive(Default)]
pub struct FakeGateway {
    fail_init: AtomicBool,
    last: Mutex<Option<(String, i64)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_init.store(failing, Ordering::SeqCst);
    }

    pub fn last_initialized(&self) -> Option<(String, i64)> {
        self.last.lock().expect("gateway mutex").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<PaymentInitiation, ServiceError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalService("gateway down".into()));
        }
        *self.last.lock().expect("gateway mutex") =
            Some((request.reference.clone(), request.amount));
        Ok(PaymentInitiation {
            reference: request.reference,
            authorization_url: Some("https://checkout.test/authorize".into()),
            amount: request.amount,
        })
    }

    async fn verify_payment(
        &self,
        reference: &str,
    ) -> Result<PaymentVerification, ServiceError> {
        match self.last.lock().expect("gateway mutex").as_ref() {
            Some((stored, amount)) if stored == reference => Ok(PaymentVerification {
                status: PaymentVerificationStatus::Success,
                amount: *amount,
                paid_at: Some(Utc::now()),
            }),
            _ => Err(ServiceError::ExternalService(format!(
                "unknown payment reference {}",
                reference
            ))),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub wallet: Arc<InMemoryWalletLedger>,
    pub gateway: Arc<FakeGateway>,
    pub event_rx: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::new_with(|_| {}).await
    }

    /// Fresh in-memory database and state, with config tweaks applied
    /// before wiring.
    pub async fn new_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut config = AppConfig::new("sqlite::memory:");
        // One connection: every pooled connection of sqlite::memory:
        // would otherwise see its own empty database.
        config.db_max_connections = 1;
        config.db_min_connections = 1;
        customize(&mut config);

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to open test database");
        db::ensure_schema(&pool)
            .await
            .expect("failed to create schema");

        let db = Arc::new(pool);
        let wallet = Arc::new(InMemoryWalletLedger::new());
        let gateway = Arc::new(FakeGateway::new());
        let (state, event_rx) =
            AppState::build(db, Arc::new(config), wallet.clone(), gateway.clone());

        Self {
            state,
            wallet,
            gateway,
            event_rx,
        }
    }

    pub async fn seed_vendor(&self, name: &str) -> VendorModel {
        vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            owner_user_id: Set(Uuid::new_v4()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed vendor")
    }

    pub async fn seed_product(
        &self,
        vendor: &VendorModel,
        name: &str,
        price: i64,
        stock: i32,
    ) -> ProductModel {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor.id),
            name: Set(name.to_string()),
            category: Set(None),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product");

        self.state
            .inventory_service
            .set_available(model.id, None, stock)
            .await
            .expect("failed to seed inventory");
        model
    }

    pub async fn seed_variant(
        &self,
        product: &ProductModel,
        sku: &str,
        price: i64,
        stock: i32,
    ) -> ProductVariantModel {
        let model = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            sku: Set(sku.to_string()),
            price: Set(price),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed variant");

        self.state
            .inventory_service
            .set_available(product.id, Some(model.id), stock)
            .await
            .expect("failed to seed variant inventory");
        model
    }
}

/// Checkout request with sane defaults for tests.
pub fn checkout_request(
    payment_method: marketplace_checkout::services::checkout::PaymentMethod,
) -> marketplace_checkout::services::checkout::CheckoutRequest {
    use marketplace_checkout::services::checkout::{Address, CheckoutRequest};
    CheckoutRequest {
        shipping_address: Address {
            line1: "12 Marina Road".into(),
            line2: None,
            city: "Lagos".into(),
            state: "LA".into(),
            country: "NG".into(),
            postal_code: Some("101241".into()),
            phone: None,
        },
        billing_address: None,
        payment_method,
        payer_email: Some("buyer@example.com".into()),
        coupon_code: None,
        notes: None,
    }
}
