use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::InfraError;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::ledger::{Ledger, LedgerError};
use crate::models::Payment;
use crate::store::LedgerStore;

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub order_id: String,
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn create_router<S: LedgerStore + 'static>(ledger: Arc<Ledger<S>>) -> Router {
    Router::new()
        .route("/create", post(create_account::<S>))
        .route("/topup", post(top_up::<S>))
        .route("/balance", post(get_balance::<S>))
        .route("/pay", post(pay::<S>))
        .route("/health", get(health_check))
        .with_state(ledger)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn reject(e: LedgerError) -> ApiError {
    let status = match &e {
        LedgerError::EmptyUserId | LedgerError::InvalidAmount | LedgerError::BalanceOverflow => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::NoAccount => StatusCode::NOT_FOUND,
        LedgerError::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Infra(InfraError::Codec(_) | InfraError::Corrupt(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        LedgerError::Infra(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "ledger request failed");
    }
    (status, Json(ErrorResponse { error: e.to_string() }))
}

pub async fn create_account<S: LedgerStore>(
    State(ledger): State<Arc<Ledger<S>>>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = ledger.create_account(&request.user_id).await.map_err(reject)?;
    Ok(Json(BalanceResponse {
        user_id: request.user_id,
        balance,
    }))
}

pub async fn top_up<S: LedgerStore>(
    State(ledger): State<Arc<Ledger<S>>>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = ledger
        .top_up(&request.user_id, request.amount)
        .await
        .map_err(reject)?;
    Ok(Json(BalanceResponse {
        user_id: request.user_id,
        balance,
    }))
}

pub async fn get_balance<S: LedgerStore>(
    State(ledger): State<Arc<Ledger<S>>>,
    Json(request): Json<AccountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = ledger.balance(&request.user_id).await.map_err(reject)?;
    Ok(Json(BalanceResponse {
        user_id: request.user_id,
        balance,
    }))
}

pub async fn pay<S: LedgerStore>(
    State(ledger): State<Arc<Ledger<S>>>,
    Json(request): Json<PayRequest>,
) -> Result<Json<Payment>, ApiError> {
    let order_id = Uuid::parse_str(&request.order_id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid order id format".to_string(),
            }),
        )
    })?;

    ledger
        .pay(order_id, &request.user_id, request.amount)
        .await
        .map(Json)
        .map_err(|e| match e {
            // Recorded as a FAILED payment, so a rejection rather than a miss.
            LedgerError::NoAccount => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { error: e.to_string() }),
            ),
            e => reject(e),
        })
}

pub async fn health_check() -> &'static str {
    "OK"
}
