use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::backend::CacheBackend;
use crate::cache::keys::generation_key;
use crate::error::StoreError;
use crate::utils::with_timeout;

/// 读响应缓存
///
/// 后端是可选依赖：未配置、出错或超时都按未命中处理，只记录日志，
/// 从不让请求因为缓存失败。
#[derive(Clone)]
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
    timeout: Duration,
}

impl ResponseCache {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match with_timeout(self.timeout, backend.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Redis error reading {}: {}", key, e);
                None
            }
        }
    }

    /// 读库之前调用；None 表示这次读到的数据不应写回缓存
    pub async fn generation(&self, key: &str) -> Option<u64> {
        let backend = self.backend.as_ref()?;
        match with_timeout(self.timeout, backend.generation(&generation_key(key))).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                tracing::error!("Redis error reading generation of {}: {}", key, e);
                None
            }
        }
    }

    /// 只有 key 自 `generation` 以来没有失效过才写入
    pub async fn set(&self, key: &str, generation: u64, value: &str, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let gen_key = generation_key(key);
        match with_timeout(
            self.timeout,
            backend.set_if_generation(key, &gen_key, generation, value, ttl),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Skipped stale snapshot for {}", key),
            Err(e) => tracing::error!("Failed to cache data under {}: {}", key, e),
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match with_timeout(self.timeout, backend.invalidate(key, &generation_key(key))).await {
            Ok(()) => tracing::debug!("Invalidated cache key {}", key),
            Err(e) => tracing::error!("Failed to invalidate cache key {}: {}", key, e),
        }
    }

    /// 读取并反序列化；无法解析的快照视为未命中
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw).map_err(StoreError::from) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        generation: u64,
        value: &T,
        ttl: Duration,
    ) {
        if !self.is_enabled() {
            return;
        }
        match serde_json::to_string(value) {
            Ok(json) => self.set(key, generation, &json, ttl).await,
            Err(e) => tracing::error!("Failed to serialize cache entry {}: {}", key, e),
        }
    }
}
