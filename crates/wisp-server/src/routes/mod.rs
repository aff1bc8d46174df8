pub mod ws;

use axum::http::{header, HeaderValue};
use axum::routing::any;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

/// `Server:` is attached here rather than per-handler so it's present on
/// every response uniformly, including ones axum generates itself (404s
/// from the fallback, panics turned into 500s, ...).
fn server_header() -> HeaderValue {
  HeaderValue::from_str(&format!("wisp-server-rs v{}", env!("CARGO_PKG_VERSION")))
    .unwrap_or_else(|_| HeaderValue::from_static("wisp-server-rs"))
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", any(ws::handler))
    .route("/{*path}", any(ws::handler))
    .layer(SetResponseHeaderLayer::overriding(header::SERVER, server_header()))
    .layer(CorsLayer::permissive())
    .with_state(state)
}
