//! Abstract contracts for the collaborators this engine consumes.
//!
//! Only the contracts live here; wire protocols belong to the
//! implementations. Checkout and escrow logic depend on these traits so
//! providers can be swapped (and mocked) without touching business
//! code.

use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payment;
pub mod wallet;

pub use payment::HttpPaymentGateway;
pub use wallet::InMemoryWalletLedger;

/// Live stock reads for cart and checkout validation. Decrements happen
/// inside the checkout transaction and are not part of this contract.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    async fn available_quantity(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<i32, ServiceError>;
}

/// Request for a hosted payment authorization.
#[derive(Debug, Clone, Serialize)]
pub struct InitializePayment {
    /// Total to collect, minor units
    pub amount: i64,
    pub payer_email: String,
    /// Our reference; the provider echoes it back
    pub reference: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub reference: String,
    pub authorization_url: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub status: PaymentVerificationStatus,
    pub amount: i64,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentVerificationStatus {
    Success,
    Pending,
    Failed,
}

/// The initialize/verify contract of the external payment provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<PaymentInitiation, ServiceError>;

    async fn verify_payment(&self, reference: &str)
        -> Result<PaymentVerification, ServiceError>;
}

/// Platform wallet balances. `debit` fails with `InsufficientFunds`
/// when the balance cannot cover the amount.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn debit(&self, user_id: Uuid, amount: i64) -> Result<(), ServiceError>;
    async fn credit(&self, user_id: Uuid, amount: i64) -> Result<(), ServiceError>;
}

/// Fire-and-forget notification delivery. Callers never treat a
/// delivery failure as their own failure; the outbox drainer is the
/// only call site.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, user_id: Uuid, kind: &str, payload: serde_json::Value);
}

/// Dispatcher that only logs. Stands in until a real transport is
/// wired up and keeps tests quiet.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(&self, user_id: Uuid, kind: &str, payload: serde_json::Value) {
        tracing::info!(%user_id, kind, %payload, "notification dispatched");
    }
}
