use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use redis::aio::ConnectionManager;
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use users_service::{
    AppState,
    cache::{
        CacheBackend, CounterStore, MemoryCounterStore, RedisCacheBackend, RedisCounterStore,
        ResponseCache,
    },
    config::{Config, Disclosure},
    create_router,
    database::{PgUserStore, UserStore, wait_for_db},
    metrics::{MetricsSink, PrometheusSink},
    middleware::RateLimiter,
};

/// 内存计数存储的清理周期
const COUNTER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// 连接 Redis 并确认可用；失败时返回 None
async fn connect_redis(url: &str, timeout: Duration) -> Option<ConnectionManager> {
    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Invalid Redis URL {}: {}", url, e);
            return None;
        }
    };

    let connect = async {
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok::<_, redis::RedisError>(conn)
    };

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(conn)) => Some(conn),
        Ok(Err(e)) => {
            tracing::warn!("Redis at {} unavailable: {}", url, e);
            None
        }
        Err(_) => {
            tracing::warn!("Redis at {} did not answer within {:?}", url, timeout);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        "Starting {} service (instance {}, environment {})",
        config.service_name,
        config.instance_id,
        config.environment
    );

    if config.is_production() && config.disclosure == Disclosure::Verbose {
        tracing::warn!("Verbose error disclosure is enabled in production");
    }

    let metrics: Arc<dyn MetricsSink> =
        Arc::new(PrometheusSink::install().context("Failed to install metrics recorder")?);

    // 设置数据库连接池
    let service_name = config.service_name.clone();
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.store_timeout())
        .after_connect(move |conn, _meta| {
            let statement = format!("SET application_name = '{}_service';", service_name);
            Box::pin(async move {
                conn.execute(statement.as_str()).await?;
                Ok(())
            })
        })
        .connect_lazy(&config.database_url)
        .context("Invalid DATABASE_URL")?;

    let store = PgUserStore::new(pool, config.store_timeout());
    wait_for_db(&store, config.db_connect_retries, config.db_retry_interval())
        .await
        .context("Database never became reachable")?;
    store
        .ensure_schema()
        .await
        .context("Failed to create users table")?;

    match store.count().await {
        Ok(count) => metrics.set_entity_count(count),
        Err(e) => tracing::warn!("Could not count users at startup: {}", e),
    }

    // 响应缓存，Redis 不可用时停用
    let cache_backend = connect_redis(&config.redis_url, config.store_timeout())
        .await
        .map(|conn| Arc::new(RedisCacheBackend::new(conn)) as Arc<dyn CacheBackend>);
    if cache_backend.is_none() {
        tracing::warn!("Response cache disabled, serving every read from the database");
    }
    let cache = ResponseCache::new(cache_backend, config.store_timeout());

    // 限流计数，Redis 不可用时退回进程内计数
    let counters: Arc<dyn CounterStore> =
        match connect_redis(&config.rate_limit_storage_url, config.store_timeout()).await {
            Some(conn) => Arc::new(RedisCounterStore::new(conn)),
            None => {
                tracing::warn!("Rate limit counters are per-instance until Redis is available");
                let store = Arc::new(MemoryCounterStore::new());
                store.clone().start_cleanup_task(COUNTER_CLEANUP_INTERVAL);
                store
            }
        };
    let limiter = RateLimiter::new(counters, config.default_tiers(), config.store_timeout())
        .with_user_routes();

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    // 设置应用状态
    let users: Arc<dyn UserStore> = Arc::new(store);
    let state = AppState::new(config, users, cache, limiter, metrics.clone());
    let app = create_router(state);

    metrics.set_service_up(true);

    // 启动服务器
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    metrics.set_service_up(false);
    Ok(())
}
