pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/translate/ko-en", post(routes::translate::translate_ko_en));

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", api)
        .route("/ws/v1/meetings/{session_id}", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<_> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Meetbridge API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/v1/health",
            "websocket": "/ws/v1/meetings/{sessionId}",
            "quick_translate": "/api/v1/translate/ko-en",
        },
    }))
}
