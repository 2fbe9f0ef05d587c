//! 集成测试公共工具

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use users_service::{
    AppState,
    cache::{
        CacheBackend, CounterStore, MemoryCacheBackend, MemoryCounterStore, ResponseCache, WindowState,
    },
    config::Config,
    create_router,
    database::{MemoryUserStore, NewUser, User, UserChanges, UserStore},
    error::StoreError,
    metrics::{MetricsSink, SecurityEvent},
    middleware::RateLimiter,
};

pub const DEFAULT_CLIENT: &str = "127.0.0.1:40000";

/// 把指标记在内存里供断言
#[derive(Default)]
pub struct RecordingMetrics {
    requests: Mutex<Vec<(String, String, u16)>>,
    events: Mutex<HashMap<&'static str, u64>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    entity_count: AtomicI64,
    up: AtomicBool,
}

impl RecordingMetrics {
    pub fn requests(&self) -> Vec<(String, String, u16)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn events(&self, event: SecurityEvent) -> u64 {
        self.events
            .lock()
            .unwrap()
            .get(event.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::SeqCst)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::SeqCst)
    }

    pub fn entity_count(&self) -> i64 {
        self.entity_count.load(Ordering::SeqCst)
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_request(&self, method: &str, endpoint: &str, status: u16, _elapsed: Duration) {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), endpoint.to_string(), status));
    }

    fn record_cache_hit(&self, _endpoint: &str) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn record_cache_miss(&self, _endpoint: &str) {
        self.cache_misses.fetch_add(1, Ordering::SeqCst);
    }

    fn record_security_event(&self, event: SecurityEvent) {
        *self.events.lock().unwrap().entry(event.as_str()).or_default() += 1;
    }

    fn set_entity_count(&self, count: i64) {
        self.entity_count.store(count, Ordering::SeqCst);
    }

    fn set_service_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn render(&self) -> String {
        format!(
            "active_users_total {}\nservice_up {}\n",
            self.entity_count(),
            u8::from(self.up.load(Ordering::SeqCst))
        )
    }
}

/// 每次调用都失败，模拟数据库不可达
pub struct FailingUserStore;

fn unreachable_db() -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(
        "connection refused (db:5432)".to_string(),
    ))
}

#[async_trait]
impl UserStore for FailingUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Err(unreachable_db())
    }
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Err(unreachable_db())
    }
    async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
        Err(unreachable_db())
    }
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
        Err(unreachable_db())
    }
    async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(unreachable_db())
    }
    async fn update(&self, _id: i64, _changes: UserChanges) -> Result<Option<User>, StoreError> {
        Err(unreachable_db())
    }
    async fn delete(&self, _id: i64) -> Result<bool, StoreError> {
        Err(unreachable_db())
    }
    async fn count(&self) -> Result<i64, StoreError> {
        Err(unreachable_db())
    }
}

/// 包装内存存储：统计调用次数，并可让下一次 list 在取完数据后暂停
#[derive(Default)]
pub struct ObservedUserStore {
    inner: MemoryUserStore,
    calls: AtomicUsize,
    hold_next_list: AtomicBool,
    /// list 已经取到数据并进入暂停
    pub list_paused: Notify,
    /// 放行暂停中的 list
    pub resume_list: Notify,
}

impl ObservedUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hold_next_list(&self) {
        self.hold_next_list.store(true, Ordering::SeqCst);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for ObservedUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.touch();
        self.inner.ping().await
    }
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        self.touch();
        let users = self.inner.list().await?;
        if self.hold_next_list.swap(false, Ordering::SeqCst) {
            self.list_paused.notify_one();
            self.resume_list.notified().await;
        }
        Ok(users)
    }
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.touch();
        self.inner.find_by_id(id).await
    }
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.touch();
        self.inner.find_by_email(email).await
    }
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        self.touch();
        self.inner.create(user).await
    }
    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        self.touch();
        self.inner.update(id, changes).await
    }
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.touch();
        self.inner.delete(id).await
    }
    async fn count(&self) -> Result<i64, StoreError> {
        self.touch();
        self.inner.count().await
    }
}

/// 始终不可用的计数存储
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn hit(&self, _key: &str, _window: Duration) -> Result<WindowState, StoreError> {
        Err(StoreError::Timeout(Duration::from_millis(50)))
    }
}

pub struct TestAppBuilder {
    env: HashMap<String, String>,
    users: Arc<dyn UserStore>,
    counters: Arc<dyn CounterStore>,
    cache: bool,
}

impl TestAppBuilder {
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn users(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = users;
        self
    }

    pub fn counters(mut self, counters: Arc<dyn CounterStore>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_cache(mut self) -> Self {
        self.cache = true;
        self
    }

    pub fn build(self) -> TestApp {
        let env = self.env;
        let config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();
        let metrics = Arc::new(RecordingMetrics::default());

        let cache = if self.cache {
            let backend: Arc<dyn CacheBackend> = Arc::new(MemoryCacheBackend::new());
            ResponseCache::new(Some(backend), config.store_timeout())
        } else {
            ResponseCache::disabled()
        };
        let limiter = RateLimiter::new(self.counters, config.default_tiers(), config.store_timeout())
            .with_user_routes();

        let state = AppState::new(
            config,
            self.users.clone(),
            cache,
            limiter,
            metrics.clone(),
        );

        TestApp {
            router: create_router(state),
            metrics,
            users: self.users,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub metrics: Arc<RecordingMetrics>,
    pub users: Arc<dyn UserStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn error(&self) -> String {
        self.json()["error"].as_str().unwrap().to_string()
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            env: HashMap::new(),
            users: Arc::new(MemoryUserStore::new()),
            counters: Arc::new(MemoryCounterStore::new()),
            cache: false,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        call(self.router.clone(), req).await
    }

    /// 在后台任务里发送请求
    pub fn spawn(&self, req: Request<Body>) -> JoinHandle<TestResponse> {
        tokio::spawn(call(self.router.clone(), req))
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(request(Method::GET, uri, None)).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, Some(body))).await
    }

    pub async fn put_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(request(Method::PUT, uri, Some(body))).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(request(Method::DELETE, uri, None)).await
    }

    /// 创建用户并返回 id
    pub async fn create_user(&self, name: &str, email: &str) -> i64 {
        let response = self
            .post_json("/users", serde_json::json!({ "name": name, "email": email }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json()["id"].as_i64().unwrap()
    }
}

async fn call(router: Router, req: Request<Body>) -> TestResponse {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    request_from(DEFAULT_CLIENT, method, uri, body)
}

/// 构造来自 `client` 连接的请求
pub fn request_from(client: &str, method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let mut req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let addr: SocketAddr = client.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}
