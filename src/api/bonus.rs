//! Bonus (ledger) service routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{liveness, ApiError, Message};
use crate::bus::{ConnectionState, ConnectionStateHandle};
use crate::config::ServerConfig;
use crate::ledger::{AccrualRequest, LedgerEngine, WriteOffRequest};
use crate::model::{Balance, Transaction};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct BonusState {
    pub engine: Arc<LedgerEngine>,
    pub consumer: ConnectionStateHandle,
}

#[derive(Debug, Deserialize)]
pub struct AccrueBody {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    #[serde(default, alias = "deliveryId")]
    pub delivery_id: Option<Uuid>,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteOffBody {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ConsumerStatus {
    pub state: ConnectionState,
}

/// Start the bonus API.
pub async fn serve(
    state: BonusState,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    super::serve("bonus", router(state), config).await
}

/// Build the axum router (separated for testing).
pub fn router(state: BonusState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/accounts/{id}/accrue", post(accrue))
        .route("/accounts/{id}/write-off", post(write_off))
        .route("/accounts/{id}/balance", get(balance))
        .route("/accounts/{id}/transactions", get(transactions))
        .route("/consumer/state", get(consumer_state))
        .with_state(state)
}

async fn root() -> Json<Message> {
    liveness("Bonus")
}

async fn accrue(
    State(state): State<BonusState>,
    Path(account_id): Path<Uuid>,
    Json(body): Json<AccrueBody>,
) -> Result<Json<Transaction>, ApiError> {
    let tx = state
        .engine
        .accrue(AccrualRequest {
            account_id,
            amount: body.amount,
            order_id: body.order_id,
            delivery_id: body.delivery_id,
            reason: body.reason,
        })
        .await?;
    Ok(Json(tx))
}

async fn write_off(
    State(state): State<BonusState>,
    Path(account_id): Path<Uuid>,
    Json(body): Json<WriteOffBody>,
) -> Result<Json<Transaction>, ApiError> {
    let tx = state
        .engine
        .write_off(WriteOffRequest {
            account_id,
            amount: body.amount,
            order_id: body.order_id,
            reason: body.reason,
        })
        .await?;
    Ok(Json(tx))
}

async fn balance(
    State(state): State<BonusState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Balance>, ApiError> {
    Ok(Json(state.engine.get_balance(account_id).await?))
}

async fn transactions(
    State(state): State<BonusState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.engine.transactions(account_id).await?))
}

async fn consumer_state(State(state): State<BonusState>) -> Json<ConsumerStatus> {
    Json(ConsumerStatus {
        state: state.consumer.get(),
    })
}
