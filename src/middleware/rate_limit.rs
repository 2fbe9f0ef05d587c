use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::cache::CounterStore;
use crate::cache::keys::rate_limit_key;
use crate::config::RateTier;
use crate::error::{AppError, StoreError};
use crate::metrics::SecurityEvent;
use crate::middleware::client::ClientKey;
use crate::utils::with_timeout;

/// 默认档位使用的作用域
const GLOBAL_SCOPE: &str = "global";

/// 不参与限流的路径
const EXEMPT_PATHS: [&str; 2] = ["/health", "/metrics"];

/// 一次限流检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Limited { tier: RateTier, retry_after: Duration },
}

/// 固定窗口限流器
///
/// 每个请求同时计入路由档位（按客户端和路由）与默认档位（按客户端），
/// 任一档位超限即拒绝。计数全部落在 [`CounterStore`] 中。
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    default_tiers: Vec<RateTier>,
    route_tiers: HashMap<String, RateTier>,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, default_tiers: Vec<RateTier>, timeout: Duration) -> Self {
        Self {
            store,
            default_tiers,
            route_tiers: HashMap::new(),
            timeout,
        }
    }

    /// 用户接口的路由档位
    pub fn with_user_routes(self) -> Self {
        self.with_route_tier(Method::GET, "/users", RateTier::per_minute(30))
            .with_route_tier(Method::GET, "/users/{id}", RateTier::per_minute(60))
            .with_route_tier(Method::POST, "/users", RateTier::per_minute(10))
            .with_route_tier(Method::PUT, "/users/{id}", RateTier::per_minute(20))
            .with_route_tier(Method::DELETE, "/users/{id}", RateTier::per_minute(10))
    }

    pub fn with_route_tier(mut self, method: Method, route: &str, tier: RateTier) -> Self {
        self.route_tiers.insert(route_scope(&method, route), tier);
        self
    }

    pub fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path)
    }

    /// 计数并判断是否超限；路由档位先于默认档位判断，所有档位都会计数
    pub async fn check(
        &self,
        client: &ClientKey,
        method: &Method,
        route: &str,
    ) -> Result<LimitDecision, StoreError> {
        let scope = route_scope(method, route);
        let route_tier = self.route_tiers.get(&scope).map(|tier| (scope.as_str(), *tier));
        let tiers = route_tier
            .into_iter()
            .chain(self.default_tiers.iter().map(|tier| (GLOBAL_SCOPE, *tier)));

        let mut decision = LimitDecision::Allowed;
        for (scope, tier) in tiers {
            let key = rate_limit_key(scope, client.as_str(), &tier);
            let state = with_timeout(self.timeout, self.store.hit(&key, tier.window)).await?;

            if state.count > tier.limit && decision == LimitDecision::Allowed {
                decision = LimitDecision::Limited {
                    tier,
                    retry_after: state.resets_in,
                };
            }
        }

        Ok(decision)
    }
}

fn route_scope(method: &Method, route: &str) -> String {
    format!("{} {}", method, route)
}

/// 只挂在受保护路由上；计数存储不可用时返回 500
pub async fn rate_limit(
    State(state): State<AppState>,
    client: ClientKey,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req.uri().path();
    if RateLimiter::is_exempt(path) {
        return Ok(next.run(req).await);
    }

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| path.to_owned());
    let method = req.method().clone();

    let decision = state
        .limiter
        .check(&client, &method, &route)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit store unavailable: {}", e);
            AppError::from(e)
        })?;

    match decision {
        LimitDecision::Allowed => Ok(next.run(req).await),
        LimitDecision::Limited { tier, retry_after } => {
            state
                .metrics
                .record_security_event(SecurityEvent::RateLimitExceeded);
            tracing::warn!(
                "Rate limit exceeded for {} on {} {} ({})",
                client,
                method,
                route,
                tier.label()
            );
            Err(AppError::RateLimited { retry_after })
        }
    }
}
