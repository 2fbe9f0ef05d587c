/// 缓存操作
/// 提供缓存操作的功能实现

// 读响应缓存
pub mod response;

// 限流计数
pub mod rate_limit;

pub use rate_limit::{CounterStore, MemoryCounterStore, RedisCounterStore};
pub use response::ResponseCache;
