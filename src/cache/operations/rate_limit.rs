use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::Script;
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use crate::cache::models::rate_limit::WindowState;
use crate::error::StoreError;

/// 计数加一；第一次计数时设置过期时间，返回 {计数, 剩余毫秒}
const HIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// 限流计数存储，必须保证并发计数不丢失
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 原子地为 key 所在窗口计数加一，窗口过期则从新窗口开始计数
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowState, StoreError>;
}

/// Redis 计数存储，所有实例共享，进程重启后窗口仍然有效
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(HIT_SCRIPT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (u64, i64) = self
            .script
            .key(key)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowState {
            count,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}

#[derive(Debug, Clone)]
struct RateWindow {
    window_start: Instant,
    window: Duration,
    count: u64,
}

/// 进程内计数存储，Redis 不可用时的后备方案，也用于测试
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, RateWindow>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理已过期的窗口
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.window_start) < w.window);
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// 启动后台清理任务
    pub fn start_cleanup_task(
        self: std::sync::Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.purge_expired();
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowState, StoreError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(RateWindow {
            window_start: now,
            window,
            count: 0,
        });

        let record = entry.value_mut();
        if now.duration_since(record.window_start) >= window {
            record.window_start = now;
            record.count = 0;
        }
        record.window = window;
        record.count += 1;

        Ok(WindowState {
            count: record.count,
            resets_in: window.saturating_sub(now.duration_since(record.window_start)),
        })
    }
}
