use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use voyage_core::StoreError;
use voyage_store::RedisClient;

use crate::error::AppError;
use crate::state::AppState;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request against `key`; false once the window is exhausted.
    async fn allow(&self, key: &str) -> Result<bool, StoreError>;
}

/// Fixed one-minute window counted in Redis.
pub struct RedisRateLimiter {
    redis: Arc<RedisClient>,
    limit: i64,
}

impl RedisRateLimiter {
    pub fn new(redis: Arc<RedisClient>, limit_per_minute: i64) -> Self {
        Self { redis, limit: limit_per_minute }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.redis.check_rate_limit(key, self.limit, 60).await?)
    }
}

pub struct NoRateLimit;

#[async_trait]
impl RateLimiter for NoRateLimit {
    async fn allow(&self, _key: &str) -> Result<bool, StoreError> {
        Ok(true)
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match state.rate_limiter.allow(&key).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!("Rate limit exceeded for {}", ip);
            Err(AppError::TooManyRequests("Rate limit exceeded".to_string()))
        }
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            Ok(next.run(req).await)
        }
    }
}
