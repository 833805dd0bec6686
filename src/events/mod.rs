use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod outbox;

/// Domain events emitted by the checkout and escrow engine.
///
/// Events are never sent straight from business logic: they are
/// appended to the transactional outbox alongside the state change and
/// dispatched by the outbox worker. Payloads are self-contained so
/// consumers do not need a database read to act on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        vendor_id: Uuid,
        order_number: String,
        total: i64,
    },
    CheckoutCompleted {
        user_id: Uuid,
        order_ids: Vec<Uuid>,
        payment_reference: Option<String>,
        grand_total: i64,
    },
    EscrowReleased {
        escrow_id: Uuid,
        order_id: Uuid,
        amount: i64,
    },
    EscrowRefunded {
        escrow_id: Uuid,
        order_id: Uuid,
        amount: i64,
    },
    EscrowDisputed {
        escrow_id: Uuid,
        dispute_id: Uuid,
    },
}

impl Event {
    /// Stable name stored in the outbox row for observability.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::CheckoutCompleted { .. } => "checkout_completed",
            Event::EscrowReleased { .. } => "escrow_released",
            Event::EscrowRefunded { .. } => "escrow_refunded",
            Event::EscrowDisputed { .. } => "escrow_disputed",
        }
    }

    /// The user this event should notify, if any, with the notification
    /// kind and payload.
    pub fn notification(&self) -> Option<(Uuid, &'static str, serde_json::Value)> {
        match self {
            Event::OrderCreated {
                user_id,
                order_number,
                total,
                ..
            } => Some((
                *user_id,
                "order_created",
                serde_json::json!({ "order_number": order_number, "total": total }),
            )),
            Event::CheckoutCompleted {
                user_id,
                grand_total,
                payment_reference,
                ..
            } => Some((
                *user_id,
                "checkout_completed",
                serde_json::json!({
                    "grand_total": grand_total,
                    "payment_reference": payment_reference,
                }),
            )),
            _ => None,
        }
    }
}

/// Cloneable handle for pushing events into the in-process bus.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {}", e))
    }

    /// Best-effort send; a closed bus is logged, never propagated.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Consumes the in-process event bus. Handlers with side effects hang
/// off this loop; today it records the stream for observability.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                ..
            } => {
                info!(%order_id, order_number, "order created");
            }
            Event::CheckoutCompleted {
                user_id, order_ids, ..
            } => {
                info!(%user_id, orders = order_ids.len(), "checkout completed");
            }
            Event::EscrowReleased {
                escrow_id, amount, ..
            } => {
                info!(%escrow_id, amount, "escrow released");
            }
            Event::EscrowRefunded {
                escrow_id, amount, ..
            } => {
                info!(%escrow_id, amount, "escrow refunded");
            }
            Event::EscrowDisputed {
                escrow_id,
                dispute_id,
            } => {
                info!(%escrow_id, %dispute_id, "escrow disputed");
            }
        }
    }

    warn!("event processing loop has ended");
}
