use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// 限流与日志使用的客户端标识，按请求来源地址计算
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// 默认只使用连接地址；位于可信反向代理之后时才读取 x-real-ip / x-forwarded-for
    pub fn from_parts(parts: &Parts, trust_proxy_headers: bool) -> Self {
        // 从连接信息获取原始IP
        let remote_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        let forwarded = if trust_proxy_headers {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .filter(|ip| !ip.trim().is_empty())
                .or_else(|| {
                    parts
                        .headers
                        .get("x-forwarded-for")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
                })
        } else {
            None
        };

        let ip = forwarded
            .or(remote_ip.as_deref())
            .unwrap_or("unknown")
            .trim()
            .to_string();

        Self(ip)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 优先使用扫描中间件已经计算好的标识
impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientKey>()
            .cloned()
            .unwrap_or_else(|| ClientKey::from_parts(parts, false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_from(builder: axum::http::request::Builder, addr: Option<&str>) -> Parts {
        let mut req = builder.body(()).unwrap();
        if let Some(addr) = addr {
            let addr: SocketAddr = addr.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req.into_parts().0
    }

    #[test]
    fn uses_connection_address() {
        let parts = parts_from(Request::builder().uri("/users"), Some("10.1.2.3:4567"));
        assert_eq!(ClientKey::from_parts(&parts, false).as_str(), "10.1.2.3");
    }

    #[test]
    fn ignores_forwarded_headers_unless_trusted() {
        let builder = Request::builder()
            .uri("/users")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1");
        let parts = parts_from(builder, Some("10.1.2.3:4567"));
        assert_eq!(ClientKey::from_parts(&parts, false).as_str(), "10.1.2.3");
        assert_eq!(ClientKey::from_parts(&parts, true).as_str(), "203.0.113.9");
    }

    #[test]
    fn prefers_real_ip_header() {
        let builder = Request::builder()
            .uri("/users")
            .header("x-real-ip", "198.51.100.7")
            .header("x-forwarded-for", "203.0.113.9");
        let parts = parts_from(builder, None);
        assert_eq!(ClientKey::from_parts(&parts, true).as_str(), "198.51.100.7");
    }

    #[test]
    fn falls_back_to_unknown() {
        let parts = parts_from(Request::builder().uri("/users"), None);
        assert_eq!(ClientKey::from_parts(&parts, true).as_str(), "unknown");
    }
}
