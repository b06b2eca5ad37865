use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::ServerSettings;
use crate::server::handlers::{health, mcp, rag};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/rag", get(rag::status).post(rag::ask))
        .route("/api/mcp", get(mcp::describe).post(mcp::invoke))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(settings: &ServerSettings) -> CorsLayer {
    let configured = settings
        .cors_allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let origins = if configured.is_empty() {
        default_local_origins()
    } else {
        configured
    };

    let allow_origin = AllowOrigin::list(
        origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>(),
    );

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(mcp::SESSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(mcp::SESSION_HEADER)])
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
