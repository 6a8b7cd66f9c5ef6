//! CORS for the browser frontend.

use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;

/// Build the CORS layer.
///
/// With no configured origin, cross-origin requests are not allowed.
#[must_use]
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => base.allow_origin(value),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Ignoring invalid CORS origin");
            base
        }
        None => base,
    }
}
