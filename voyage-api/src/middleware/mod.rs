pub mod auth;
pub mod rate_limit;

pub use auth::{admin_auth_middleware, auth_middleware, Claims};
pub use rate_limit::{rate_limit_middleware, NoRateLimit, RateLimiter, RedisRateLimiter};
