//! HTTP surfaces of the delivery and bonus services.
//!
//! Each service exposes `router()` (separated for testing) and `serve()`.
//! Errors render as `{"detail": "..."}` with validation failures as 400,
//! unknown ids as 404 and infrastructure failures as 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::delivery::DeliveryError;
use crate::ledger::LedgerError;

pub mod bonus;
pub mod delivery;

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Liveness body.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

/// Handler-level error, mapped to a status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DeliveryError::InvalidTransition { .. } => ApiError::BadRequest(err.to_string()),
            DeliveryError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

/// Bind and serve `app` with request tracing.
pub async fn serve(
    name: &'static str,
    app: Router,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = app.layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    let addr = listener.local_addr()?;
    info!(service = name, %addr, "HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn liveness(service: &str) -> Json<Message> {
    Json(Message {
        message: format!("{} service is running", service),
    })
}

#[cfg(test)]
mod tests;
