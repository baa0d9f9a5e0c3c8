//! Delivery service routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use super::{liveness, ApiError, Message};
use crate::config::ServerConfig;
use crate::delivery::DeliveryService;
use crate::model::{Delivery, DeliveryPatch, NewDelivery};

type AppState = Arc<DeliveryService>;

/// Start the delivery API.
pub async fn serve(
    service: Arc<DeliveryService>,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    super::serve("delivery", router(service), config).await
}

/// Build the axum router (separated for testing).
pub fn router(service: Arc<DeliveryService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/deliveries", get(list_deliveries).post(create_delivery))
        .route(
            "/deliveries/{id}",
            get(get_delivery).patch(update_delivery),
        )
        .with_state(service)
}

async fn root() -> Json<Message> {
    liveness("Delivery")
}

async fn create_delivery(
    State(service): State<AppState>,
    Json(body): Json<NewDelivery>,
) -> Result<Json<Delivery>, ApiError> {
    Ok(Json(service.create(body).await?))
}

async fn update_delivery(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DeliveryPatch>,
) -> Result<Json<Delivery>, ApiError> {
    Ok(Json(service.update(id, patch).await?))
}

async fn get_delivery(
    State(service): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, ApiError> {
    Ok(Json(service.get(id).await?))
}

async fn list_deliveries(State(service): State<AppState>) -> Result<Json<Vec<Delivery>>, ApiError> {
    Ok(Json(service.list().await?))
}
