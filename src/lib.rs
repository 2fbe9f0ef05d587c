use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::database::UserStore;
use crate::metrics::MetricsSink;
use crate::middleware::{RateLimiter, ThreatScanner};

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod utils;

pub use router::create_router;

/// 所有处理器与中间件共享的状态，启动时构建一次
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub cache: ResponseCache,
    pub limiter: Arc<RateLimiter>,
    pub scanner: Arc<ThreatScanner>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl AppState {
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        cache: ResponseCache,
        limiter: RateLimiter,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            users,
            cache,
            limiter: Arc::new(limiter),
            scanner: Arc::new(ThreatScanner::default()),
            metrics,
        }
    }
}
