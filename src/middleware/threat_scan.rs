use axum::{
    body::{Body, Bytes, to_bytes},
    extract::State,
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::AppState;
use crate::error::AppError;
use crate::metrics::SecurityEvent;
use crate::middleware::client::ClientKey;

/// 可疑特征：SQL 元字符与关键字、脚本注入标记、路径穿越序列
pub const SUSPICIOUS_PATTERNS: [&str; 13] = [
    "'",
    "\"",
    "--",
    ";",
    "DROP",
    "DELETE FROM",
    "INSERT INTO",
    "<script",
    "javascript:",
    "onerror=",
    "../",
    "..\\",
    "etc/passwd",
];

/// 单次扫描结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub matched: bool,
    /// 第一个命中的特征
    pub pattern: Option<&'static str>,
}

/// 大小写不敏感的特征扫描器，只做检测不拦截
#[derive(Debug, Clone)]
pub struct ThreatScanner {
    patterns: Vec<(String, &'static str)>,
}

impl Default for ThreatScanner {
    fn default() -> Self {
        Self::new(&SUSPICIOUS_PATTERNS)
    }
}

impl ThreatScanner {
    pub fn new(patterns: &[&'static str]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| (p.to_lowercase(), *p)).collect(),
        }
    }

    pub fn scan(&self, content: &str) -> ScanOutcome {
        if content.is_empty() {
            return ScanOutcome {
                matched: false,
                pattern: None,
            };
        }

        let lowered = content.to_lowercase();
        let pattern = self
            .patterns
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, label)| *label);

        ScanOutcome {
            matched: pattern.is_some(),
            pattern,
        }
    }
}

/// 拼接待扫描内容：解码后的查询参数、表单字段以及原始请求体
fn request_content(parts: &Parts, body: &Bytes) -> String {
    let mut content = String::new();

    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            content.push_str(&key);
            content.push('=');
            content.push_str(&value);
            content.push('\n');
        }
    }

    let is_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        for (key, value) in url::form_urlencoded::parse(body) {
            content.push_str(&key);
            content.push('=');
            content.push_str(&value);
            content.push('\n');
        }
    }

    content.push_str(&String::from_utf8_lossy(body));
    content
}

/// 扫描每个请求；命中时记录安全事件和告警日志，请求照常继续
pub async fn scan_request(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let client = ClientKey::from_parts(&parts, state.config.trust_proxy_headers);

    let bytes = to_bytes(body, state.config.max_body_bytes)
        .await
        .map_err(|e| {
            warn!("Rejected request body from {}: {}", client, e);
            AppError::PayloadTooLarge
        })?;

    let outcome = state.scanner.scan(&request_content(&parts, &bytes));
    if let Some(pattern) = outcome.pattern {
        state
            .metrics
            .record_security_event(SecurityEvent::SuspiciousPattern);
        warn!(
            "Suspicious request from {}: Pattern '{}' detected in {} {}",
            client,
            pattern,
            parts.method,
            parts.uri.path()
        );
    }

    parts.extensions.insert(client);
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
