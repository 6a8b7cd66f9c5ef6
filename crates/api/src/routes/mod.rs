//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (database)
//!
//! # Orders (bearer auth)
//! GET    /api/orders
//! POST   /api/orders
//! GET    /api/orders/{orderId}
//! POST   /api/orders/{orderId}/orderlines
//! DELETE /api/orders/{orderId}/orderlines/{fishId}
//! POST   /api/orders/{orderId}/pay
//!
//! # Users
//! POST /api/users/register-customer
//! POST /api/users/staff                 (bearer auth, manager)
//! POST /api/users/login
//! GET  /api/users/me                    (bearer auth)
//! GET  /api/users/login/google
//! GET  /api/users/login/google/callback
//!
//! # Catalog
//! GET  /api/fishs?search=
//! GET  /api/fishs/{fishId}
//! ```

pub mod fish;
pub mod health;
pub mod orders;
pub mod users;

use axum::{
    Router,
    extract::{
        FromRequest, FromRequestParts, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::HeaderName,
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{cors_layer, request_id::REQUEST_ID_HEADER, request_id_middleware};
use crate::state::AppState;

/// JSON body extractor whose rejections are `400` responses in the API's error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Path extractor with API-format rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Path rejected");
        Self::BadRequest("Invalid path parameter".to_owned())
    }
}

/// Query-string extractor with API-format rejections.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Query rejected");
        Self::BadRequest("Invalid query string".to_owned())
    }
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::create))
        .route("/{order_id}", get(orders::show))
        .route("/{order_id}/orderlines", post(orders::add_line))
        .route(
            "/{order_id}/orderlines/{fish_id}",
            delete(orders::remove_line),
        )
        .route("/{order_id}/pay", post(orders::pay))
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register-customer", post(users::register_customer))
        .route("/staff", post(users::add_staff))
        .route("/login", post(users::login))
        .route("/me", get(users::me))
        .route("/login/google", get(users::google_login))
        .route("/login/google/callback", get(users::google_callback))
}

/// Create the fish catalog routes router.
pub fn fish_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(fish::list))
        .route("/{fish_id}", get(fish::show))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/orders", order_routes())
        .nest("/api/users", user_routes())
        .nest("/api/fishs", fish_routes())
}

/// The full application: routes, tracing, request IDs and CORS.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState, cors_origin: Option<&str>) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    routes()
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request| {
                let request_id = request
                    .headers()
                    .get(&request_id_header)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
