use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    AppState,
    middleware::{
        cors_layer, log_errors, panic_response, rate_limit, scan_request, track_metrics,
        with_security_headers,
    },
    routes,
};

// 受限流保护的用户路由
fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(routes::user::list_users).post(routes::user::create_user),
        )
        .route(
            "/users/{id}",
            get(routes::user::get_user)
                .put(routes::user::update_user)
                .delete(routes::user::delete_user),
        )
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
}

// 运维路由，不限流
fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
}

/// 组装完整的请求管道
///
/// 由外到内：安全头、CORS、请求指标、错误记录、panic 捕获、威胁扫描、限流、处理器。
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(system_routes())
        .merge(user_routes(&state))
        .fallback(routes::health::not_found)
        .layer(from_fn_with_state(state.clone(), scan_request))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.config.disclosure, log_errors))
        .layer(from_fn_with_state(state.metrics.clone(), track_metrics))
        .layer(cors_layer(&state.config.cors_origins));

    let instance_id = state.config.instance_id.clone();
    with_security_headers(router, &instance_id).with_state(state)
}
