use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store_ok = state.store.ping().await;
    let redis_ok = state.cache.health_check().await;
    // A configured Redis that failed to connect still counts as required.
    let redis_required = state.cache.is_configured();

    let status = if store_ok && (redis_ok || !redis_required) {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "store": store_ok,
        "redis": redis_ok,
        "stripe": state.stripe.is_some(),
        "timestamp": chrono::Utc::now(),
    }))
}
