//! Multi-vendor checkout and escrow settlement engine.
//!
//! Turns a shopping cart into one order per vendor, prices each order
//! (shipping, tax, commission, coupon discount), holds payment in
//! escrow per order and settles that escrow on delivery or
//! cancellation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod handlers;
pub mod services;

use axum::{routing::get, Json, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use cache::CartCache;
use events::{Event, EventSender};
use gateways::{PaymentGateway, WalletLedger};
use services::{
    CartService, CheckoutService, CommissionService, CouponService, EscrowService,
    InventoryService, SettlementService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: EventSender,
    pub cart_service: Arc<CartService>,
    pub checkout_service: Arc<CheckoutService>,
    pub escrow_service: Arc<EscrowService>,
    pub coupon_service: Arc<CouponService>,
    pub commission_service: Arc<CommissionService>,
    pub inventory_service: Arc<InventoryService>,
    pub settlement_service: Arc<SettlementService>,
}

impl AppState {
    /// Wires every service onto one database pool and cart cache.
    /// Returns the receiving end of the event bus so the caller decides
    /// where `process_events` runs.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        wallet: Arc<dyn WalletLedger>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(1024);
        let event_sender = EventSender::new(tx);

        let cache = Arc::new(CartCache::new(config.checkout.cart_ttl_secs));
        let inventory_service = Arc::new(InventoryService::new(db.clone()));
        let cart_service = Arc::new(CartService::new(
            db.clone(),
            cache,
            inventory_service.clone(),
            config.checkout.clone(),
        ));
        let coupon_service = Arc::new(CouponService::new(db.clone()));
        let commission_service = Arc::new(CommissionService::new(db.clone()));
        let escrow_service = Arc::new(EscrowService::new(db.clone()));
        let checkout_service = Arc::new(CheckoutService::new(
            db.clone(),
            cart_service.clone(),
            wallet,
            gateway.clone(),
            config.clone(),
        ));
        let settlement_service = Arc::new(SettlementService::new(
            db.clone(),
            escrow_service.clone(),
            gateway,
        ));

        (
            Self {
                db,
                config,
                event_sender,
                cart_service,
                checkout_service,
                escrow_service,
                coupon_service,
                commission_service,
                inventory_service,
                settlement_service,
            },
            rx,
        )
    }
}

/// Standard response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API result type for JSON responses.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Versioned API surface: carts, checkout, orders, escrows, coupons and
/// commission rules.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/carts", handlers::carts::routes())
        .nest("/checkout", handlers::checkout::routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/escrows", handlers::escrows::routes())
        .nest("/coupons", handlers::coupons::routes())
        .nest("/commission", handlers::commission::routes())
}

async fn api_status() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ApiResponse<Value>> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(ApiResponse::success(json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
