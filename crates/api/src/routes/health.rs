use axum::{Json, extract::State, http::StatusCode};
use bson::doc;

use crate::state::AppState;

/// Liveness plus dependency reachability. Degraded dependencies flip the
/// status code so a load balancer can take the instance out of rotation.
pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mongo_ok = state.db.run_command(doc! { "ping": 1 }).await.is_ok();

    let mut conn = state.redis.clone();
    let redis_ok = redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok();

    let status = if mongo_ok && redis_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "mongo": mongo_ok,
        "redis": redis_ok,
    });
    (status, Json(body))
}
