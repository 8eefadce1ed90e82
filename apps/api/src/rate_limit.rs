//! Fixed-window request limiting backed by Redis counters.
//!
//! Each bucket (`auth`, `ai`) counts requests per client per window under
//! `ratelimit:<bucket>:<client>:<window>`. The key expires with its window.
//! When Redis is unreachable requests are let through and a warning is logged.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;
use crate::state::AppState;

const REDIS_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Auth,
    Ai,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Ai => "ai",
        }
    }
}

/// Window index and seconds until it rolls over.
pub fn window_for(now_secs: u64, window_secs: u64) -> (u64, u64) {
    let window_secs = window_secs.max(1);
    (
        now_secs / window_secs,
        window_secs - now_secs % window_secs,
    )
}

pub fn counter_key(bucket: Bucket, client: &str, window: u64) -> String {
    format!("ratelimit:{}:{client}:{window}", bucket.as_str())
}

/// First `X-Forwarded-For` hop, else the peer address, else `unknown`.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

async fn increment(state: &AppState, key: &str, ttl_secs: u64) -> redis::RedisResult<u64> {
    let mut conn = state.redis.get_multiplexed_async_connection().await?;
    let count: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
    if count == 1 {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
    }
    Ok(count)
}

async fn enforce(
    state: &AppState,
    bucket: Bucket,
    limit: u64,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let (window, retry_after_secs) = window_for(now, state.config.rate_limit_window_secs);
    let key = counter_key(bucket, &client, window);

    match tokio::time::timeout(REDIS_TIMEOUT, increment(state, &key, retry_after_secs)).await {
        Ok(Ok(count)) if count > limit => {
            tracing::warn!(
                bucket = bucket.as_str(),
                client = %client,
                "Rate limit exceeded ({count}/{limit})"
            );
            return Err(AppError::TooManyRequests { retry_after_secs });
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("Rate limiter unavailable, allowing request: {e}"),
        Err(_) => tracing::warn!("Rate limiter timed out, allowing request"),
    }

    Ok(next.run(request).await)
}

/// Limits login, registration and token endpoints.
pub async fn limit_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = state.config.auth_rate_limit;
    enforce(&state, Bucket::Auth, limit, request, next).await
}

/// Limits the assistant endpoints, which each cost a model call.
pub async fn limit_ai(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limit = state.config.ai_rate_limit;
    enforce(&state, Bucket::Ai, limit, request, next).await
}
