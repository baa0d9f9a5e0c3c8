//! End-to-end flow through the in-process queue: delivery service publishes,
//! consumer credits the ledger.

use super::*;
use std::time::Duration;

use crate::bus::LedgerAccrualHandler;
use crate::delivery::DeliveryService;
use crate::ledger::LedgerEngine;
use crate::model::{DeliveryPatch, DeliveryStatus};
use crate::storage::MockLedgerStore;
use crate::test_utils::{channel_delivery_service, completion_event, ledger_engine, new_delivery};
use uuid::Uuid;

fn consumer_config(ack_mode: AckMode) -> ConsumerConfig {
    ConsumerConfig {
        ack_mode,
        max_delivery_attempts: 3,
        retry_delay_ms: 0,
        ..ConsumerConfig::default()
    }
}

fn consumer(bus: &ChannelBus, engine: Arc<LedgerEngine>, ack_mode: AckMode) -> ChannelConsumer {
    ChannelConsumer::new(
        bus.clone(),
        Arc::new(LedgerAccrualHandler::new(engine)),
        &consumer_config(ack_mode),
    )
}

async fn complete_delivery(service: &DeliveryService, bus: &ChannelBus, order: Uuid) -> Uuid {
    let before = bus.pending().await;
    let delivery = service.create(new_delivery(order)).await.unwrap();
    for status in [DeliveryStatus::Assigned, DeliveryStatus::Delivered] {
        service
            .update(
                delivery.id,
                DeliveryPatch {
                    courier_id: None,
                    status: Some(status),
                },
            )
            .await
            .unwrap();
    }
    // publish runs on a spawned task
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.pending().await == before {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    delivery.id
}

#[tokio::test]
async fn test_completed_delivery_credits_bonus() {
    let (bus, service) = channel_delivery_service();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store);
    let order = Uuid::new_v4();
    let before = engine.get_balance(order).await.unwrap().current_balance;

    let delivery_id = complete_delivery(&service, &bus, order).await;
    let dispositions = consumer(&bus, engine.clone(), AckMode::AfterCommit)
        .drain()
        .await;

    assert_eq!(dispositions, vec![Disposition::Ack]);
    assert_eq!(bus.acked().await, 1);
    let history = engine.transactions(order).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].delivery_id, Some(delivery_id));
    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        before + 50.0
    );
}

#[tokio::test]
async fn test_two_deliveries_same_order_credit_twice() {
    let (bus, service) = channel_delivery_service();
    let engine = ledger_engine(Arc::new(MockLedgerStore::new()));
    let order = Uuid::new_v4();

    complete_delivery(&service, &bus, order).await;
    complete_delivery(&service, &bus, order).await;
    consumer(&bus, engine.clone(), AckMode::AfterCommit)
        .drain()
        .await;

    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        100.0
    );
}

#[tokio::test]
async fn test_always_mode_acks_and_loses_accrual_on_ledger_failure() {
    let (bus, service) = channel_delivery_service();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store.clone());
    let order = Uuid::new_v4();

    complete_delivery(&service, &bus, order).await;
    complete_delivery(&service, &bus, order).await;

    store.set_fail_on_commit(true).await;
    let dispositions = consumer(&bus, engine.clone(), AckMode::Always)
        .drain()
        .await;
    store.set_fail_on_commit(false).await;

    assert_eq!(dispositions, vec![Disposition::Ack, Disposition::Ack]);
    assert_eq!(bus.acked().await, 2);
    assert_eq!(bus.pending().await, 0);
    assert!(bus.dead_letters().await.is_empty());
    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        0.0
    );
}

#[tokio::test]
async fn test_after_commit_retries_then_dead_letters() {
    let bus = ChannelBus::new();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store.clone());
    let order = Uuid::new_v4();
    bus.publish(Arc::new(completion_event(Uuid::new_v4(), order)))
        .await
        .unwrap();

    store.set_fail_on_commit(true).await;
    let dispositions = consumer(&bus, engine.clone(), AckMode::AfterCommit)
        .drain()
        .await;

    assert_eq!(dispositions.len(), 3);
    assert_eq!(dispositions[0], Disposition::Retry { next_attempt: 2 });
    assert_eq!(dispositions[1], Disposition::Retry { next_attempt: 3 });
    assert!(matches!(dispositions[2], Disposition::DeadLetter { .. }));
    assert_eq!(bus.acked().await, 0);
    assert_eq!(bus.dead_letters().await.len(), 1);
    assert_eq!(store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_after_commit_retry_recovers() {
    let bus = ChannelBus::new();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store.clone());
    let order = Uuid::new_v4();
    bus.publish(Arc::new(completion_event(Uuid::new_v4(), order)))
        .await
        .unwrap();
    let consumer = consumer(&bus, engine.clone(), AckMode::AfterCommit);

    store.set_fail_on_commit(true).await;
    assert_eq!(
        consumer.process_next().await,
        Some(Disposition::Retry { next_attempt: 2 })
    );
    store.set_fail_on_commit(false).await;
    assert_eq!(consumer.process_next().await, Some(Disposition::Ack));
    assert_eq!(consumer.process_next().await, None);

    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        50.0
    );
}

#[tokio::test]
async fn test_redelivered_event_is_not_double_credited() {
    let bus = ChannelBus::new();
    let engine = ledger_engine(Arc::new(MockLedgerStore::new()));
    let order = Uuid::new_v4();
    let event = Arc::new(completion_event(Uuid::new_v4(), order));

    bus.publish(event.clone()).await.unwrap();
    bus.publish(event).await.unwrap();
    let dispositions = consumer(&bus, engine.clone(), AckMode::AfterCommit)
        .drain()
        .await;

    assert_eq!(dispositions, vec![Disposition::Ack, Disposition::Ack]);
    assert_eq!(engine.transactions(order).await.unwrap().len(), 1);
    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        50.0
    );
}

#[tokio::test]
async fn test_missing_correlation_is_discarded_not_dead_lettered() {
    let bus = ChannelBus::new();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store.clone());

    bus.publish_raw(br#"{"delivery_id":null,"order_id":null,"completed_at":null}"#.to_vec())
        .await;
    bus.publish_raw(b"garbage".to_vec()).await;
    let dispositions = consumer(&bus, engine, AckMode::AfterCommit).drain().await;

    assert_eq!(dispositions[0], Disposition::Ack);
    assert!(matches!(dispositions[1], Disposition::DeadLetter { .. }));
    assert_eq!(bus.dead_letters().await[0].payload, b"garbage".to_vec());
    assert_eq!(store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_run_marks_consuming_and_processes() {
    let bus = ChannelBus::new();
    let engine = ledger_engine(Arc::new(MockLedgerStore::new()));
    let state = ConnectionStateHandle::new();
    let order = Uuid::new_v4();

    let task = tokio::spawn(
        consumer(&bus, engine.clone(), AckMode::AfterCommit).run(state.clone()),
    );
    bus.publish(Arc::new(completion_event(Uuid::new_v4(), order)))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.acked().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    task.abort();

    assert_eq!(state.get(), ConnectionState::Consuming);
    assert_eq!(
        engine.get_balance(order).await.unwrap().current_balance,
        50.0
    );
}

#[tokio::test]
async fn test_retries_wait_longer_after_each_failure() {
    let bus = ChannelBus::new();
    let store = Arc::new(MockLedgerStore::new());
    let engine = ledger_engine(store.clone());
    bus.publish(Arc::new(completion_event(Uuid::new_v4(), Uuid::new_v4())))
        .await
        .unwrap();
    let config = ConsumerConfig {
        retry_delay_ms: 20,
        ..consumer_config(AckMode::AfterCommit)
    };
    let consumer = ChannelConsumer::new(
        bus.clone(),
        Arc::new(LedgerAccrualHandler::new(engine)),
        &config,
    );

    store.set_fail_on_commit(true).await;
    let started = std::time::Instant::now();
    let dispositions = consumer.drain().await;

    // 20ms before attempt 2, 40ms before attempt 3
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(dispositions.len(), 3);
    assert_eq!(bus.dead_letters().await.len(), 1);
}
