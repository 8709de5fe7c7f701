use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::metrics;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness))
        .route("/config", get(engine_config))
        .route("/get_ram_info", get(ram_info))
}

async fn liveness() -> Json<Value> {
    Json(json!({"success": true, "message": "I am the StreamStorm Engine"}))
}

async fn engine_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "log_file_path": state.engine.log_file_path(),
    }))
}

async fn ram_info(State(state): State<AppState>) -> Json<Value> {
    Json(metrics::ram_info(&state.registry.probe().sample()))
}
