//! Public HTTP surface: four operations, thin over the engine and store.
//!
//! Client-visible failures are always JSON bodies with a `status` or
//! `error` field on HTTP 200; 5xx is reserved for store faults.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use common::time::now_ms;
use common::TraceId;
use mint::{MintEngine, SessionStatus};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MintEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mint-progress", get(mint_progress))
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/check-payment-status/{session_id}", get(check_payment_status))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateIntentRequest {
    quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CreateIntentReply {
    Created {
        success: bool,
        #[serde(rename = "sessionId")]
        session_id: String,
        amount: String,
        #[serde(rename = "paymentAddress")]
        payment_address: String,
    },
    Rejected {
        error: String,
    },
}

async fn create_payment_intent(
    State(state): State<AppState>,
    Json(req): Json<CreateIntentRequest>,
) -> (StatusCode, Json<CreateIntentReply>) {
    let trace = TraceId::default();

    // Out-of-range request bodies funnel into the engine's own validation.
    let quantity = u32::try_from(req.quantity).unwrap_or(0);

    match state.engine.create_intent(quantity).await {
        Ok(intent) => {
            info!(
                trace_id = %trace,
                session_id = %intent.session_id,
                quantity,
                "payment intent issued"
            );
            (
                StatusCode::OK,
                Json(CreateIntentReply::Created {
                    success: true,
                    session_id: intent.session_id,
                    amount: intent.amount_due.to_string(),
                    payment_address: intent.address,
                }),
            )
        }
        Err(e) if e.is_client_error() => (
            StatusCode::OK,
            Json(CreateIntentReply::Rejected {
                error: e.to_string(),
            }),
        ),
        Err(e) => {
            error!(trace_id = %trace, error = %e, "payment intent creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CreateIntentReply::Rejected {
                    error: "Internal error.".to_string(),
                }),
            )
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StatusReply {
    Pending,
    Expired {
        message: String,
    },
    PaymentPending {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        txid: Option<String>,
    },
    Complete {
        items: Vec<ItemRef>,
        quantity: u32,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct ItemRef {
    cid: String,
}

async fn check_payment_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<StatusReply>) {
    let session = match state.engine.store().session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "status lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusReply::Error {
                    message: "Internal error.".to_string(),
                }),
            );
        }
    };

    let Some(session) = session else {
        // Kept at 200: polling clients treat non-200 as a transport fault.
        return (
            StatusCode::OK,
            Json(StatusReply::Error {
                message: "Invalid session.".to_string(),
            }),
        );
    };

    let reply = match session.status {
        SessionStatus::Pending if session.timed_out(now_ms()) => StatusReply::Expired {
            message: "Payment window elapsed; the reservation was released.".to_string(),
        },
        SessionStatus::Pending => StatusReply::Pending,
        SessionStatus::PaymentPending => StatusReply::PaymentPending {
            message: "Payment detected; waiting for confirmation.".to_string(),
            txid: session.txid,
        },
        SessionStatus::Complete => StatusReply::Complete {
            items: session
                .assigned_refs
                .into_iter()
                .map(|cid| ItemRef { cid })
                .collect(),
            quantity: session.quantity,
        },
        SessionStatus::Failed => StatusReply::Error {
            message: "Payment could not be completed.".to_string(),
        },
    };

    (StatusCode::OK, Json(reply))
}

async fn mint_progress(State(state): State<AppState>) -> Response {
    match state.engine.progress().await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => {
            error!(error = %e, "progress read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusReply::Error {
                    message: "Internal error.".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum HealthReply {
    Healthy {
        status: &'static str,
        timestamp: u64,
    },
    Unhealthy {
        status: &'static str,
        error: String,
    },
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReply>) {
    match state.engine.store().available_count().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthReply::Healthy {
                status: "healthy",
                timestamp: now_ms(),
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthReply::Unhealthy {
                status: "unhealthy",
                error: e.to_string(),
            }),
        ),
    }
}
