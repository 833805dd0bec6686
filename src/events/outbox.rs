//! Transactional outbox.
//!
//! Business services append events here with [`enqueue`] on the same
//! connection as their state change, so an event exists if and only if
//! the change committed. The worker drains pending rows into the
//! in-process event bus and the notification dispatcher; a delivery
//! failure backs off and retries, and can never affect the transaction
//! that produced the event.

use crate::entities::{
    outbox_event::{self, OutboxStatus},
    OutboxEvent, OutboxEventModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateways::NotificationDispatcher;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;
const POLL_INTERVAL_MS: u64 = 500;
const BATCH_SIZE: u64 = 50;

/// Appends a domain event on the caller's connection. Call this inside
/// the same transaction as the write the event describes.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    event: &Event,
) -> Result<(), ServiceError> {
    let payload =
        serde_json::to_value(event).map_err(|e| ServiceError::Other(anyhow::Error::from(e)))?;

    let row = outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event.kind().to_string()),
        payload: Set(payload),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(Utc::now()),
        processed_at: Set(None),
        error_message: Set(None),
        created_at: Set(Utc::now()),
    };
    row.insert(conn).await?;
    Ok(())
}

/// Spawns the background drain loop.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    sender: EventSender,
    notifier: Arc<dyn NotificationDispatcher>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("outbox worker started");
        loop {
            match drain_once(&db, &sender, notifier.as_ref(), BATCH_SIZE).await {
                Ok(0) => sleep(Duration::from_millis(POLL_INTERVAL_MS)).await,
                Ok(_) => {}
                Err(e) => {
                    error!("outbox worker error: {}", e);
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
            }
        }
    })
}

/// Drains one batch of due pending events. Returns how many rows were
/// processed. Public so tests (and embedded runtimes without the spawned
/// worker) can drive the outbox deterministically.
pub async fn drain_once(
    db: &DatabaseConnection,
    sender: &EventSender,
    notifier: &dyn NotificationDispatcher,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let batch: Vec<OutboxEventModel> = OutboxEvent::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_event::Column::AvailableAt.lte(now))
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let count = batch.len();
    for row in batch {
        match serde_json::from_value::<Event>(row.payload.clone()) {
            Ok(event) => {
                let delivered = sender.send(event.clone()).await.is_ok();
                if delivered {
                    if let Some((user_id, kind, payload)) = event.notification() {
                        notifier.notify(user_id, kind, payload).await;
                    }
                    mark_delivered(db, row).await?;
                } else {
                    schedule_retry(db, row, "event bus closed").await?;
                }
            }
            Err(e) => {
                // Undecodable payloads would retry forever; park them.
                warn!(id = %row.id, "dropping undecodable outbox event: {}", e);
                mark_failed(db, row, &format!("undecodable payload: {}", e)).await?;
            }
        }
    }
    Ok(count)
}

async fn mark_delivered(
    db: &DatabaseConnection,
    row: OutboxEventModel,
) -> Result<(), ServiceError> {
    let mut active: outbox_event::ActiveModel = row.into();
    active.status = Set(OutboxStatus::Delivered);
    active.processed_at = Set(Some(Utc::now()));
    active.error_message = Set(None);
    active.update(db).await?;
    Ok(())
}

async fn schedule_retry(
    db: &DatabaseConnection,
    row: OutboxEventModel,
    reason: &str,
) -> Result<(), ServiceError> {
    let attempts = row.attempts + 1;
    if attempts >= MAX_ATTEMPTS {
        return mark_failed(db, row, "max attempts exceeded").await;
    }

    let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
    let mut active: outbox_event::ActiveModel = row.into();
    active.attempts = Set(attempts);
    active.available_at = Set(Utc::now() + ChronoDuration::seconds(backoff));
    active.error_message = Set(Some(reason.to_string()));
    active.update(db).await?;
    Ok(())
}

async fn mark_failed(
    db: &DatabaseConnection,
    row: OutboxEventModel,
    reason: &str,
) -> Result<(), ServiceError> {
    let mut active: outbox_event::ActiveModel = row.into();
    active.status = Set(OutboxStatus::Failed);
    active.error_message = Set(Some(reason.to_string()));
    active.update(db).await?;
    Ok(())
}
