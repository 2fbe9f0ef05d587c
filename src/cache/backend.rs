use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::time::Instant;

use crate::error::StoreError;

/// 代数未变时写入快照并设置过期时间；代数键不存在视为 0
const SET_IF_GENERATION_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if (current or '0') ~= ARGV[2] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[3])
return 1
"#;

/// 响应缓存的存储后端
///
/// 每个快照键带一个代数键。失效时代数加一并删除快照，
/// 写入时只有代数与读库前一致才生效，避免旧快照覆盖失效结果。
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 当前代数，从未失效过为 0
    async fn generation(&self, gen_key: &str) -> Result<u64, StoreError>;

    /// 原子地比较代数并写入，返回是否写入
    async fn set_if_generation(
        &self,
        key: &str,
        gen_key: &str,
        generation: u64,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// 代数加一并删除快照
    async fn invalidate(&self, key: &str, gen_key: &str) -> Result<(), StoreError>;
}

/// Redis 缓存后端，多个实例共享
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
    set_script: Script,
}

impl RedisCacheBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            set_script: Script::new(SET_IF_GENERATION_SCRIPT),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn generation(&self, gen_key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn.get(gen_key).await?;
        Ok(generation.unwrap_or(0))
    }

    async fn set_if_generation(
        &self,
        key: &str,
        gen_key: &str,
        generation: u64,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let stored: i64 = self
            .set_script
            .key(key)
            .key(gen_key)
            .arg(value)
            .arg(generation.to_string())
            .arg((ttl.as_millis() as u64).max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(stored == 1)
    }

    async fn invalidate(&self, key: &str, gen_key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .incr(gen_key, 1)
            .ignore()
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// 进程内缓存后端，过期项在读取时惰性删除
///
/// 加锁顺序固定为先代数后快照：比较并写入和失效都持有代数条目的锁。
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, (String, Instant)>,
    generations: DashMap<String, u64>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if now < *expires_at {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| now >= *expires_at);
        Ok(None)
    }

    async fn generation(&self, gen_key: &str) -> Result<u64, StoreError> {
        Ok(self.generations.get(gen_key).map_or(0, |g| *g))
    }

    async fn set_if_generation(
        &self,
        key: &str,
        gen_key: &str,
        generation: u64,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let current = self.generations.entry(gen_key.to_string()).or_default();
        if *current != generation {
            return Ok(false);
        }
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        drop(current);
        Ok(true)
    }

    async fn invalidate(&self, key: &str, gen_key: &str) -> Result<(), StoreError> {
        let mut current = self.generations.entry(gen_key.to_string()).or_default();
        *current += 1;
        self.entries.remove(key);
        drop(current);
        Ok(())
    }
}
