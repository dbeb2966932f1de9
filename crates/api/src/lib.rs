pub mod auth;
pub mod error;
pub mod state;
pub mod ws;

use axum::{Router, routing::get};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Everything external collaborators are out of scope for (REST CRUD for
/// registration, tenants, channels, recordings, ...) lives elsewhere; this
/// process only ever serves the signaling/SFU socket and a health check.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Drives `RoomRegistry::sweep`'s periodic defense-in-depth pass (spec.md
/// §4.1: "additional room-level sweep every 2 minutes"), grounded on the
/// teacher's `background::task_service` ticking-task shape.
pub fn spawn_reap_sweep(state: AppState) {
    let interval = std::time::Duration::from_secs(state.settings.reap.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.room_registry.sweep().await;
        }
    });
}
