//! REST API — the read-only guess statistics reporting surface.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::error;

use masquerade_core::stats;

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/stats", get(get_stats))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let records = match state.sink.read_all().await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to read guess records: {}", e);
            return Json(json!({"error": "stats unavailable"}));
        }
    };
    let matrix = stats::aggregate(&records);
    Json(json!({
        "total": matrix.total(),
        "tp": matrix.tp,
        "fp": matrix.fp,
        "fn": matrix.fn_,
        "tn": matrix.tn,
    }))
}
