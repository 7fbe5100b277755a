use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::Value;

use crate::error::ApiError;

/// Replayed responses live this long. A kiosk that retries after a network
/// timeout always lands well inside the window.
const TTL_SECS: u64 = 24 * 60 * 60;

/// Optional `Idempotency-Key` request header, honored by the kiosk mutations
/// and punch backfill. Successful responses are cached per (tenant, key) and
/// replayed verbatim, so a retry cannot double-apply.
#[derive(Debug, Clone)]
pub struct IdempotencyKey(pub Option<String>);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("Idempotency-Key")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match key {
            Some(k) if k.len() > 255 => {
                Err(ApiError::Validation("Idempotency-Key trop longue".into()))
            }
            Some(k) => Ok(IdempotencyKey(Some(k.to_string()))),
            None => Ok(IdempotencyKey(None)),
        }
    }
}

fn cache_key(tenant: &str, key: &str) -> String {
    format!("idem:{tenant}:{key}")
}

/// Returns the cached response for (tenant, key), if any. Redis trouble reads
/// as a miss — the request then re-executes, which the transactional guards
/// keep safe.
pub async fn fetch_cached(
    redis: &mut redis::aio::MultiplexedConnection,
    tenant: &str,
    key: &str,
) -> Option<Value> {
    let raw: Option<String> = redis::cmd("GET")
        .arg(cache_key(tenant, key))
        .query_async(redis)
        .await
        .ok()?;
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

/// Cache a successful response body. Failures are logged, never surfaced.
pub async fn store_response(
    redis: &mut redis::aio::MultiplexedConnection,
    tenant: &str,
    key: &str,
    body: &Value,
) {
    let result: Result<(), redis::RedisError> = redis::cmd("SET")
        .arg(cache_key(tenant, key))
        .arg(body.to_string())
        .arg("EX")
        .arg(TTL_SECS)
        .query_async(redis)
        .await;

    if let Err(e) = result {
        tracing::warn!("idempotency cache store failed for tenant {tenant}: {e}");
    }
}
