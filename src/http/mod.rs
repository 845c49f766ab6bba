//! HTTP surface: rate limiting middleware and the check service.

mod middleware;
mod server;

pub use middleware::{
    rate_limit, KeyExtractor, RateLimitGuard, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
};
pub use server::HttpServer;
