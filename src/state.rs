use std::sync::Arc;

use crate::config::Config;
use crate::routes::rate_limit::RateLimiter;
use crate::store::{TaskStore, UserStore};

/// Everything a handler may touch. Store handles are injected here once at
/// startup; handlers never reach for a global connection.
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub limiter: Arc<RateLimiter>,
    pub jwt_secret: Arc<str>,
    pub jwt_ttl_hours: i64,
    pub version: Arc<str>,
}

impl AppState {
    pub fn new(config: &Config, tasks: Arc<dyn TaskStore>, users: Arc<dyn UserStore>) -> Self {
        Self {
            tasks,
            users,
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_window,
                config.rate_limit_max,
            )),
            jwt_secret: config.jwt_secret.as_str().into(),
            jwt_ttl_hours: config.jwt_ttl_hours,
            version: config.version.as_str().into(),
        }
    }
}
