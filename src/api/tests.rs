use super::*;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::bus::{CompletionNotifier, ConnectionState, ConnectionStateHandle, MockEventBus};
use crate::config::Config;
use crate::delivery::DeliveryService;
use crate::ledger::LedgerEngine;
use crate::storage::{MockDeliveryStore, MockLedgerStore};
use crate::test_utils::{ledger_engine, mock_delivery_service};
use crate::utils::bootstrap::{open_delivery_store, open_ledger_store};

fn delivery_app() -> Router {
    let (_, service) = mock_delivery_service();
    delivery::router(Arc::new(service))
}

fn bonus_app() -> (ConnectionStateHandle, Router) {
    let consumer = ConnectionStateHandle::new();
    let state = bonus::BonusState {
        engine: ledger_engine(Arc::new(MockLedgerStore::new())),
        consumer: consumer.clone(),
    };
    (consumer, bonus::router(state))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn new_delivery_body(order_id: Uuid) -> Value {
    json!({
        "orderId": order_id,
        "addressFrom": "1 Depot Road",
        "addressTo": "42 Harbour Street",
        "recipientName": "Sam Carter",
        "recipientPhone": "+15550100"
    })
}

#[test]
fn test_error_status_mapping() {
    assert_eq!(
        ApiError::from(DeliveryError::NotFound(Uuid::nil())).status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        ApiError::from(LedgerError::InsufficientFunds {
            available: 0.0,
            requested: 1.0
        })
        .status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        ApiError::from(LedgerError::Storage(crate::storage::StorageError::Unavailable(
            "down".to_string()
        )))
        .status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_delivery_root() {
    let app = delivery_app();
    let (status, body) = call(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_delivery_lifecycle_over_http() {
    let app = delivery_app();
    let order = Uuid::new_v4();

    let (status, created) = call(
        &app,
        Method::POST,
        "/deliveries",
        Some(new_delivery_body(order)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "CREATED");
    assert_eq!(created["order_id"], order.to_string());
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/deliveries/{}", id);

    let courier = Uuid::new_v4();
    let (status, updated) = call(
        &app,
        Method::PATCH,
        &uri,
        Some(json!({"courierId": courier, "status": "ASSIGNED"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "ASSIGNED");
    assert_eq!(updated["courier_id"], courier.to_string());
    assert!(updated["assigned_date"].is_string());

    let (status, body) = call(&app, Method::PATCH, &uri, Some(json!({"status": "CREATED"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("ASSIGNED"));

    let (status, fetched) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "ASSIGNED");

    let (status, list) = call(&app, Method::GET, "/deliveries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delivery_unknown_id_is_404() {
    let app = delivery_app();
    let uri = format!("/deliveries/{}", Uuid::new_v4());

    let (status, body) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({"status": "ASSIGNED"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bonus_accrue_write_off_balance() {
    let (_, app) = bonus_app();
    let account = Uuid::new_v4();
    let order = Uuid::new_v4();

    let (status, tx) = call(
        &app,
        Method::POST,
        &format!("/accounts/{}/accrue", account),
        Some(json!({"orderId": order, "amount": 200.0, "reason": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["type"], "ACCRUAL");
    assert_eq!(tx["amount"], 200.0);

    let (status, tx) = call(
        &app,
        Method::POST,
        &format!("/accounts/{}/write-off", account),
        Some(json!({"order_id": order, "amount": 50.0, "reason": "purchase"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["type"], "WRITE_OFF");

    let (status, balance) = call(
        &app,
        Method::GET,
        &format!("/accounts/{}/balance", account),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["current_balance"], 150.0);
    assert_eq!(balance["account_id"], account.to_string());

    let (status, history) = call(
        &app,
        Method::GET,
        &format!("/accounts/{}/transactions", account),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_bonus_validation_is_400() {
    let (_, app) = bonus_app();
    let account = Uuid::new_v4();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/accounts/{}/write-off", account),
        Some(json!({"orderId": Uuid::new_v4(), "amount": 1000.0, "reason": "r"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("Available: 0"));
    assert!(detail.contains("requested: 1000"));

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/accounts/{}/accrue", account),
        Some(json!({"orderId": Uuid::new_v4(), "amount": -5.0, "reason": "r"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bonus_balance_of_unknown_account_is_zero() {
    let (_, app) = bonus_app();
    let (status, balance) = call(
        &app,
        Method::GET,
        &format!("/accounts/{}/balance", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["current_balance"], 0.0);
}

#[tokio::test]
async fn test_bonus_consumer_state() {
    let (consumer, app) = bonus_app();

    let (_, body) = call(&app, Method::GET, "/consumer/state", None).await;
    assert_eq!(body["state"], "DISCONNECTED");

    consumer.set(ConnectionState::Consuming);
    let (status, body) = call(&app, Method::GET, "/consumer/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CONSUMING");
}

#[tokio::test]
async fn test_delivery_store_failure_is_500() {
    let store = Arc::new(MockDeliveryStore::new());
    let service = DeliveryService::new(
        store.clone(),
        CompletionNotifier::new(Arc::new(MockEventBus::new())),
    );
    let app = delivery::router(Arc::new(service));
    store.set_fail_on_write(true).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/deliveries",
        Some(new_delivery_body(Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());

    let (_, list) = call(&app, Method::GET, "/deliveries", None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

/// Config on a port that is already bound.
async fn config_with_taken_port() -> (tokio::net::TcpListener, Config) {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = Config::for_test();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = taken.local_addr().unwrap().port();
    (taken, config)
}

/// Same startup chain as the delivery binary.
async fn start_delivery(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_delivery_store(&config).await?;
    let service = DeliveryService::new(
        store,
        CompletionNotifier::new(Arc::new(MockEventBus::new())),
    );
    delivery::serve(Arc::new(service), &config.server).await?;
    Ok(())
}

/// Same startup chain as the bonus binary.
async fn start_bonus(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_ledger_store(&config).await?;
    let state = bonus::BonusState {
        engine: Arc::new(LedgerEngine::new(store, config.ledger.clone())),
        consumer: ConnectionStateHandle::new(),
    };
    bonus::serve(state, &config.server).await?;
    Ok(())
}

#[tokio::test]
async fn test_delivery_startup_surfaces_bind_failure() {
    let (_taken, config) = config_with_taken_port().await;
    let err = start_delivery(config).await.unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn test_bonus_startup_surfaces_bind_failure() {
    let (_taken, config) = config_with_taken_port().await;
    let err = start_bonus(config).await.unwrap_err();
    assert!(!err.to_string().is_empty());
}
