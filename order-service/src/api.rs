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
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{Order, OrderStatus};
use crate::service::Orders;
use crate::store::OrderStore;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn create_router<S: OrderStore + 'static>(orders: Arc<Orders<S>>) -> Router {
    Router::new()
        .route("/create", post(create_order::<S>))
        .route("/list", post(list_orders::<S>))
        .route("/status", post(get_status::<S>))
        .route("/health", get(health_check))
        .with_state(orders)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

fn reject(e: OrderError) -> ApiError {
    let status = match &e {
        OrderError::EmptyUserId | OrderError::InvalidAmount | OrderError::DescriptionTooLong => {
            StatusCode::BAD_REQUEST
        }
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::Infra(InfraError::Codec(_) | InfraError::Corrupt(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        OrderError::Infra(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "order request failed");
    }
    (status, Json(ErrorResponse { error: e.to_string() }))
}

pub async fn create_order<S: OrderStore>(
    State(orders): State<Arc<Orders<S>>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    orders
        .create_order(&request.user_id, request.amount, &request.description)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn list_orders<S: OrderStore>(
    State(orders): State<Arc<Orders<S>>>,
    Json(request): Json<ListOrdersRequest>,
) -> Result<Json<Vec<Order>>, ApiError> {
    if request.user_id.is_empty() {
        return Err(reject(OrderError::EmptyUserId));
    }
    orders
        .list_orders(&request.user_id)
        .await
        .map(Json)
        .map_err(reject)
}

pub async fn get_status<S: OrderStore>(
    State(orders): State<Arc<Orders<S>>>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = Uuid::parse_str(&request.id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid order id format".to_string(),
            }),
        )
    })?;

    let status = orders.get_status(id).await.map_err(reject)?;
    Ok(Json(StatusResponse { status }))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrderStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(Arc::new(Orders::new(MemoryOrderStore::default())))
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn create_then_query_status() {
        let app = app();

        let (status, order) = post_json(
            &app,
            "/create",
            json!({"user_id": "u1", "amount": 100, "description": "book"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "NEW");
        assert_eq!(order["amount"], 100);

        let (status, body) = post_json(&app, "/status", json!({"id": order["id"]})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "NEW"}));

        let (status, body) = post_json(&app, "/list", json!({"user_id": "u1"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn maps_errors_to_status_codes() {
        let app = app();

        let (status, body) = post_json(
            &app,
            "/create",
            json!({"user_id": "u1", "amount": 0, "description": "book"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "order amount should be greater than 0");

        let (status, _) = post_json(&app, "/status", json!({"id": "not-a-uuid"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(&app, "/status", json!({"id": Uuid::new_v4()})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
