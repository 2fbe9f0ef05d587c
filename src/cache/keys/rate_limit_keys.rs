use crate::config::RateTier;

/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成限流计数键：前缀 + 作用域 + 客户端 + 档位
pub fn rate_limit_key(scope: &str, client: &str, tier: &RateTier) -> String {
    format!("{}{}:{}:{}", RATE_LIMIT_PREFIX, scope, client, tier.label())
}
