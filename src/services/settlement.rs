use crate::{
    entities::{
        inventory_level,
        order::{self, OrderStatus, PaymentStatus},
        order_item, InventoryLevel, Order, OrderItem, OrderModel,
    },
    errors::ServiceError,
    gateways::{PaymentGateway, PaymentVerificationStatus},
    services::escrow::EscrowService,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Post-checkout settlement entry points: the single payment
/// confirmation call, and the delivery/cancellation events that move
/// escrow out of `Held`.
#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DatabaseConnection>,
    escrow: Arc<EscrowService>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SettlementService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        escrow: Arc<EscrowService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            escrow,
            gateway,
        }
    }

    /// Verifies a gateway reference and, on success, marks every order
    /// carrying it as paid and confirmed. Safe to call repeatedly: only
    /// pending orders are touched.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, reference: &str) -> Result<Vec<OrderModel>, ServiceError> {
        let verification = self.gateway.verify_payment(reference).await?;
        if verification.status != PaymentVerificationStatus::Success {
            return Err(ServiceError::Conflict(format!(
                "payment {} is not successful (status {:?})",
                reference, verification.status
            )));
        }

        let orders = Order::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .all(&*self.db)
            .await?;
        if orders.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no orders found for payment reference {}",
                reference
            )));
        }

        let expected: i64 = orders.iter().map(|o| o.total).sum();
        if verification.amount != expected {
            warn!(
                reference,
                paid = verification.amount,
                expected,
                "payment amount does not match order totals"
            );
            return Err(ServiceError::Conflict(format!(
                "payment {} amount {} does not match expected {}",
                reference, verification.amount, expected
            )));
        }

        Order::update_many()
            .set(order::ActiveModel {
                payment_status: Set(PaymentStatus::Paid),
                status: Set(OrderStatus::Confirmed),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::PaymentReference.eq(reference))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        let updated = Order::find()
            .filter(order::Column::PaymentReference.eq(reference))
            .all(&*self.db)
            .await?;
        info!(reference, orders = updated.len(), "payment confirmed");
        Ok(updated)
    }

    /// Delivery confirmation: releases the order's escrow to the
    /// sellers and marks the order delivered.
    #[instrument(skip(self))]
    pub async fn confirm_delivery(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.find_order(order_id).await?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::Conflict(format!(
                "order {} has not been paid",
                order.order_number
            )));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(ServiceError::Conflict(format!(
                "order {} is already {:?}",
                order.order_number, order.status
            )));
        }

        let ledger = self.escrow.get_by_order(order_id).await?;
        self.escrow.release(ledger.id, reason).await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Delivered);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(%order_id, "delivery confirmed, escrow released");
        Ok(updated)
    }

    /// Cancellation: refunds the order's escrow to the buyer, marks the
    /// order cancelled and returns its quantities to stock.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.find_order(order_id).await?;
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(ServiceError::Conflict(format!(
                "order {} is already {:?}",
                order.order_number, order.status
            )));
        }

        let ledger = self.escrow.get_by_order(order_id).await?;
        self.escrow.refund(ledger.id, reason).await?;

        let txn = self.db.begin().await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in items {
            let mut restock = InventoryLevel::update_many()
                .col_expr(
                    inventory_level::Column::Available,
                    Expr::col(inventory_level::Column::Available).add(item.quantity),
                )
                .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(inventory_level::Column::ProductId.eq(item.product_id));
            restock = match item.variant_id {
                Some(v) => restock.filter(inventory_level::Column::VariantId.eq(v)),
                None => restock.filter(inventory_level::Column::VariantId.is_null()),
            };
            restock.exec(&txn).await?;
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, "order cancelled, escrow refunded, stock returned");
        Ok(updated)
    }

    async fn find_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
