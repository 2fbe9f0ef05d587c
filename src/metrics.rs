//! Prometheus 指标
//!
//! 处理函数和中间件只通过 AppState 里的 [`MetricsSink`] 上报，不直接调用宏。

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "http_errors_total";
pub const CACHE_HITS: &str = "cache_hits_total";
pub const CACHE_MISSES: &str = "cache_misses_total";
pub const SECURITY_EVENTS: &str = "security_events_total";
pub const SERVICE_UP: &str = "service_up";
pub const ACTIVE_USERS: &str = "active_users_total";

const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// 安全事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEvent {
    SuspiciousPattern,
    InvalidInput,
    InvalidEmail,
    RateLimitExceeded,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::SuspiciousPattern => "suspicious_pattern",
            SecurityEvent::InvalidInput => "invalid_input",
            SecurityEvent::InvalidEmail => "invalid_email",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
        }
    }
}

/// 指标上报接口
pub trait MetricsSink: Send + Sync {
    fn record_request(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration);
    fn record_cache_hit(&self, endpoint: &str);
    fn record_cache_miss(&self, endpoint: &str);
    fn record_security_event(&self, event: SecurityEvent);
    fn set_entity_count(&self, count: i64);
    fn set_service_up(&self, up: bool);
    /// `/metrics` 返回的文本格式
    fn render(&self) -> String;
}

/// 基于全局 recorder 的 Prometheus 实现
pub struct PrometheusSink {
    handle: PrometheusHandle,
}

impl PrometheusSink {
    /// 安装全局 recorder，每个进程只能调用一次
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &LATENCY_BUCKETS)?
            .install_recorder()?;
        Ok(Self::from_handle(handle))
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }
}

impl MetricsSink for PrometheusSink {
    fn record_request(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        counter!(
            REQUESTS_TOTAL,
            "method" => method.to_string(),
            "endpoint" => endpoint.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            REQUEST_DURATION,
            "method" => method.to_string(),
            "endpoint" => endpoint.to_string()
        )
        .record(elapsed.as_secs_f64());

        if status >= 400 {
            counter!(
                ERRORS_TOTAL,
                "method" => method.to_string(),
                "endpoint" => endpoint.to_string(),
                "status" => status.to_string()
            )
            .increment(1);
        }
    }

    fn record_cache_hit(&self, endpoint: &str) {
        counter!(CACHE_HITS, "endpoint" => endpoint.to_string()).increment(1);
    }

    fn record_cache_miss(&self, endpoint: &str) {
        counter!(CACHE_MISSES, "endpoint" => endpoint.to_string()).increment(1);
    }

    fn record_security_event(&self, event: SecurityEvent) {
        counter!(SECURITY_EVENTS, "type" => event.as_str()).increment(1);
    }

    fn set_entity_count(&self, count: i64) {
        gauge!(ACTIVE_USERS).set(count as f64);
    }

    fn set_service_up(&self, up: bool) {
        gauge!(SERVICE_UP).set(if up { 1.0 } else { 0.0 });
    }

    fn render(&self) -> String {
        self.handle.render()
    }
}
