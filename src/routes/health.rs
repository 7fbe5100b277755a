use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness + dependency check. Redis is load-bearing here (rate limiting,
/// idempotency), so it is probed alongside Postgres.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": e.to_string() })),
            )
        }
    };

    let mut redis = state.redis.clone();
    let redis_status = match redis::cmd("PING")
        .query_async::<String>(&mut redis)
        .await
    {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": db, "redis": e.to_string() })),
            )
        }
    };

    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "db": db, "redis": redis_status })),
    )
}
