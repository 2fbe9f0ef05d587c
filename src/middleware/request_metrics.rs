use std::sync::Arc;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::metrics::MetricsSink;

/// 未匹配任何路由时使用的端点标签
const UNKNOWN_ENDPOINT: &str = "unknown";

/// 记录请求数、耗时与错误数；/metrics 自身不计入
pub async fn track_metrics(
    State(metrics): State<Arc<dyn MetricsSink>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNKNOWN_ENDPOINT.to_string());

    let response = next.run(req).await;
    metrics.record_request(&method, &endpoint, response.status().as_u16(), start.elapsed());
    response
}
