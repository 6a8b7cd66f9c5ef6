//! Order routes.
//!
//! ```text
//! GET    /api/orders                             - List caller's orders
//! POST   /api/orders                             - Create order
//! GET    /api/orders/{orderId}                   - Get order
//! POST   /api/orders/{orderId}/orderlines        - Add line
//! DELETE /api/orders/{orderId}/orderlines/{fishId} - Remove line
//! POST   /api/orders/{orderId}/pay               - Mark paid
//! ```

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use koi_farm_core::{FishId, OrderId, PaymentStatus, Price, UserId};

use super::{ApiJson, ApiPath};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderLine};
use crate::services::OrderLineInput;
use crate::state::AppState;

/// A line as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub fish_id: FishId,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
}

impl From<&OrderLine> for OrderLineView {
    fn from(line: &OrderLine) -> Self {
        Self {
            fish_id: line.fish_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total(),
        }
    }
}

/// An order as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub payment_status: PaymentStatus,
    pub order_lines: Vec<OrderLineView>,
    pub total: Price,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            payment_status: order.status,
            order_lines: order.lines.iter().map(OrderLineView::from).collect(),
            total: order.total(),
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
            paid_at: order.paid_at,
        }
    }
}

/// Body for adding a line.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub fish_id: FishId,
    pub quantity: i64,
}

impl From<OrderLineRequest> for OrderLineInput {
    fn from(req: OrderLineRequest) -> Self {
        Self {
            fish_id: req.fish_id,
            quantity: req.quantity,
        }
    }
}

/// Body for creating an order.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub order_lines: Vec<OrderLineRequest>,
}

/// List the caller's orders.
///
/// GET /api/orders
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Json<Vec<OrderView>>> {
    let orders = state.orders().list_orders(&caller).await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

/// Create an order, optionally with initial lines.
///
/// POST /api/orders
#[instrument(skip(state, caller, body), fields(user_id = %caller.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderView>)> {
    let request: CreateOrderRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateOrderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let lines = request
        .order_lines
        .into_iter()
        .map(OrderLineInput::from)
        .collect();

    let order = state.orders().create_order(&caller, lines).await?;
    Ok((StatusCode::CREATED, Json(OrderView::from(&order))))
}

/// Fetch one order.
///
/// GET /api/orders/{orderId}
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiPath(order_id): ApiPath<OrderId>,
) -> Result<Json<OrderView>> {
    let order = state.orders().get_order(&caller, order_id).await?;
    Ok(Json(OrderView::from(&order)))
}

/// Add a fish to an order.
///
/// POST /api/orders/{orderId}/orderlines
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn add_line(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiPath(order_id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<OrderLineRequest>,
) -> Result<Json<OrderView>> {
    let order = state
        .orders()
        .add_order_line(&caller, order_id, body.into())
        .await?;
    Ok(Json(OrderView::from(&order)))
}

/// Remove a fish from an order.
///
/// DELETE /api/orders/{orderId}/orderlines/{fishId}
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn remove_line(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiPath((order_id, fish_id)): ApiPath<(OrderId, FishId)>,
) -> Result<StatusCode> {
    state
        .orders()
        .remove_order_line(&caller, order_id, fish_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark an order as paid.
///
/// POST /api/orders/{orderId}/pay
#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiPath(order_id): ApiPath<OrderId>,
) -> Result<Json<OrderView>> {
    let order = state.orders().pay_for_order(&caller, order_id).await?;
    Ok(Json(OrderView::from(&order)))
}
