use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

/// 每个响应都带上的安全头
pub fn security_headers(instance_id: &str) -> Vec<(HeaderName, HeaderValue)> {
    let instance = HeaderValue::from_str(instance_id).unwrap_or_else(|_| {
        tracing::warn!("INSTANCE_ID {:?} is not a valid header value", instance_id);
        HeaderValue::from_static("unknown")
    });

    vec![
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ),
        (HeaderName::from_static("x-instance-id"), instance),
    ]
}

pub fn with_security_headers<S>(router: Router<S>, instance_id: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    security_headers(instance_id)
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(name, value))
        })
}

/// 只允许配置中的来源，允许携带凭据
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
