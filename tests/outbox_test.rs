//! Transactional outbox: enqueue-with-commit, drain, delivery marking
//! and retry backoff.

mod common;

use common::TestApp;
use marketplace_checkout::{
    entities::{outbox_event::OutboxStatus, OutboxEvent},
    events::{outbox, Event, EventSender},
    gateways::LogNotifier,
};
use sea_orm::EntityTrait;
use tokio::sync::mpsc;
use uuid::Uuid;

fn sample_event() -> Event {
    Event::OrderCreated {
        order_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        vendor_id: Uuid::new_v4(),
        order_number: "ORD-TEST-1".into(),
        total: 5_000,
    }
}

#[tokio::test]
async fn drained_events_reach_the_bus_and_are_marked_delivered() {
    let app = TestApp::new().await;
    outbox::enqueue(&*app.state.db, "order", None, &sample_event())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let processed = outbox::drain_once(&app.state.db, &EventSender::new(tx), &LogNotifier, 50)
        .await
        .unwrap();
    assert_eq!(processed, 1);

    let received = rx.recv().await.expect("event on the bus");
    assert_eq!(received.kind(), "order_created");

    let row = OutboxEvent::find().one(&*app.state.db).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Delivered);
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn failed_delivery_backs_off_and_stays_pending() {
    let app = TestApp::new().await;
    outbox::enqueue(&*app.state.db, "order", None, &sample_event())
        .await
        .unwrap();

    // receiver dropped: every send fails
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let sender = EventSender::new(tx);

    let processed = outbox::drain_once(&app.state.db, &sender, &LogNotifier, 50)
        .await
        .unwrap();
    assert_eq!(processed, 1);

    let row = OutboxEvent::find().one(&*app.state.db).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 1);
    assert!(row.error_message.is_some());

    // backed off into the future, so an immediate drain sees nothing
    let processed = outbox::drain_once(&app.state.db, &sender, &LogNotifier, 50)
        .await
        .unwrap();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn drain_handles_a_mixed_batch() {
    let app = TestApp::new().await;
    for _ in 0..3 {
        outbox::enqueue(&*app.state.db, "order", None, &sample_event())
            .await
            .unwrap();
    }
    outbox::enqueue(
        &*app.state.db,
        "escrow",
        None,
        &Event::EscrowReleased {
            escrow_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: 100,
        },
    )
    .await
    .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let processed = outbox::drain_once(&app.state.db, &EventSender::new(tx), &LogNotifier, 50)
        .await
        .unwrap();
    assert_eq!(processed, 4);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
    }
    assert_eq!(kinds.len(), 4);
    assert_eq!(kinds.iter().filter(|k| **k == "order_created").count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == "escrow_released").count(), 1);
}
