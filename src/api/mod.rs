use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the full HTTP application: routes, state and layers.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .route("/generate_qr", get(handlers::generate_qr))
        .route("/api/tokens", get(handlers::list_tokens))
        .route("/api/tokens/invalidate", post(handlers::invalidate_token))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(crate::middleware::request_id))
        .layer(middleware::from_fn(crate::middleware::security_headers))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Any origin unless one is configured.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => AllowOrigin::exact(value),
        None => {
            if let Some(o) = origin {
                tracing::warn!("ignoring invalid CORS origin '{}', allowing any origin", o);
            }
            AllowOrigin::from(Any)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::HeaderName::from_static("x-request-id"),
        ])
}
