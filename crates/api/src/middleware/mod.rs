//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (browser frontend origin)
//!
//! Authentication is an extractor ([`RequireAuth`]) rather than a layer, so
//! public routes need no opt-out.

pub mod auth;
pub mod cors;
pub mod request_id;

pub use auth::RequireAuth;
pub use cors::cors_layer;
pub use request_id::request_id_middleware;
