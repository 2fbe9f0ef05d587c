// 缓存模块
// 包含响应缓存、限流计数存储及其 Redis/内存后端

pub mod backend;
pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型，方便其他模块使用
pub use backend::{CacheBackend, MemoryCacheBackend, RedisCacheBackend};
pub use models::WindowState;
pub use operations::{CounterStore, MemoryCounterStore, RedisCounterStore, ResponseCache};
