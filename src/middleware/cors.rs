use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Open origin, but only the verbs this API actually serves.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(Any)
        .allow_origin(Any)
}
