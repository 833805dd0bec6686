use crate::{
    entities::{
        escrow_ledger::{self, EscrowStatus},
        EscrowLedger, EscrowLedgerModel,
    },
    errors::ServiceError,
    events::{outbox, Event},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Escrow ledger. Funds enter as `Held` when checkout persists an
/// order and leave exactly once, through `release` or `refund`. The
/// terminal UPDATE carries a `status = Held` filter, so of two
/// concurrent settlement calls only one can win; the loser observes
/// zero affected rows and gets a `Conflict`.
#[derive(Clone)]
pub struct EscrowService {
    db: Arc<DatabaseConnection>,
}

impl EscrowService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, escrow_id: Uuid) -> Result<EscrowLedgerModel, ServiceError> {
        EscrowLedger::find_by_id(escrow_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Escrow {} not found", escrow_id)))
    }

    pub async fn get_by_order(&self, order_id: Uuid) -> Result<EscrowLedgerModel, ServiceError> {
        EscrowLedger::find()
            .filter(escrow_ledger::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Escrow for order {} not found", order_id))
            })
    }

    /// Creates the `Held` row for a freshly persisted order. Runs on the
    /// caller's connection so it joins the checkout transaction.
    pub async fn create_held_on<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        buyer_id: Uuid,
        seller_ids: &[Uuid],
        amount: i64,
    ) -> Result<EscrowLedgerModel, ServiceError> {
        if amount < 0 {
            return Err(ServiceError::InvariantViolation(format!(
                "attempted to hold negative escrow amount {} for order {}",
                amount, order_id
            )));
        }

        let ledger = escrow_ledger::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            buyer_id: Set(buyer_id),
            seller_ids: Set(serde_json::json!(seller_ids)),
            amount_held: Set(amount),
            amount_released: Set(0),
            amount_refunded: Set(0),
            status: Set(EscrowStatus::Held),
            dispute_id: Set(None),
            status_reason: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        Ok(ledger.insert(conn).await?)
    }

    /// Releases the remaining balance to the sellers. Terminal.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        escrow_id: Uuid,
        reason: &str,
    ) -> Result<EscrowLedgerModel, ServiceError> {
        self.settle(escrow_id, reason, EscrowStatus::Released).await
    }

    /// Refunds the remaining balance to the buyer. Terminal.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        escrow_id: Uuid,
        reason: &str,
    ) -> Result<EscrowLedgerModel, ServiceError> {
        self.settle(escrow_id, reason, EscrowStatus::Refunded).await
    }

    /// Annotates the ledger with a dispute reference. Amounts and
    /// status are untouched; dispute resolution has no reopen path.
    #[instrument(skip(self))]
    pub async fn attach_dispute(
        &self,
        escrow_id: Uuid,
        dispute_id: Uuid,
    ) -> Result<EscrowLedgerModel, ServiceError> {
        let txn = self.db.begin().await?;

        let ledger = EscrowLedger::find_by_id(escrow_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Escrow {} not found", escrow_id)))?;

        let mut active: escrow_ledger::ActiveModel = ledger.into();
        active.dispute_id = Set(Some(dispute_id));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            "escrow",
            Some(escrow_id),
            &Event::EscrowDisputed {
                escrow_id,
                dispute_id,
            },
        )
        .await?;

        txn.commit().await?;

        info!(%escrow_id, %dispute_id, "attached dispute to escrow");
        Ok(updated)
    }

    async fn settle(
        &self,
        escrow_id: Uuid,
        reason: &str,
        target: EscrowStatus,
    ) -> Result<EscrowLedgerModel, ServiceError> {
        let txn = self.db.begin().await?;

        let ledger = EscrowLedger::find_by_id(escrow_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Escrow {} not found", escrow_id)))?;

        if ledger.status != EscrowStatus::Held {
            return Err(ServiceError::Conflict(format!(
                "Escrow {} is already {:?}",
                escrow_id, ledger.status
            )));
        }

        let settled = ledger.amount_released + ledger.amount_refunded;
        if settled > ledger.amount_held {
            // Stored amounts already break the ledger invariant. A bug
            // wrote this row; refuse to touch it.
            error!(
                %escrow_id,
                amount_held = ledger.amount_held,
                amount_released = ledger.amount_released,
                amount_refunded = ledger.amount_refunded,
                "escrow balance invariant violated"
            );
            return Err(ServiceError::InvariantViolation(format!(
                "escrow {} settled amounts exceed amount held",
                escrow_id
            )));
        }

        let remaining = ledger.amount_held - settled;
        if remaining <= 0 {
            return Err(ServiceError::Conflict(format!(
                "Escrow {} has no remaining balance",
                escrow_id
            )));
        }

        let mut patch = escrow_ledger::ActiveModel {
            status: Set(target),
            status_reason: Set(Some(reason.to_string())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match target {
            EscrowStatus::Released => {
                patch.amount_released = Set(ledger.amount_released + remaining);
            }
            EscrowStatus::Refunded => {
                patch.amount_refunded = Set(ledger.amount_refunded + remaining);
            }
            EscrowStatus::Held => unreachable!("settlement target is always terminal"),
        }

        let result = EscrowLedger::update_many()
            .set(patch)
            .filter(escrow_ledger::Column::Id.eq(escrow_id))
            .filter(escrow_ledger::Column::Status.eq(EscrowStatus::Held))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            // Another call settled this ledger between our read and the
            // guarded update.
            return Err(ServiceError::Conflict(format!(
                "Escrow {} was settled concurrently",
                escrow_id
            )));
        }

        let updated = EscrowLedger::find_by_id(escrow_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Escrow {} not found", escrow_id)))?;

        if updated.amount_released + updated.amount_refunded > updated.amount_held {
            return Err(ServiceError::InvariantViolation(format!(
                "escrow {} settlement would overdraw the held amount",
                escrow_id
            )));
        }

        let event = match target {
            EscrowStatus::Released => Event::EscrowReleased {
                escrow_id,
                order_id: updated.order_id,
                amount: remaining,
            },
            _ => Event::EscrowRefunded {
                escrow_id,
                order_id: updated.order_id,
                amount: remaining,
            },
        };
        outbox::enqueue(&txn, "escrow", Some(escrow_id), &event).await?;

        txn.commit().await?;

        info!(
            %escrow_id,
            status = ?updated.status,
            amount = remaining,
            "settled escrow"
        );
        Ok(updated)
    }
}
