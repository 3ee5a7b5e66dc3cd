use std::sync::Arc;
use voyage_core::BookingService;

use crate::metrics::Metrics;
use crate::middleware::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingService,
    pub auth: AuthConfig,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub metrics: Arc<Metrics>,
}
