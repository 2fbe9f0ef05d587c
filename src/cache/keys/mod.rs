/// 缓存键模块
/// 提供各种缓存键生成函数

// 用户集合缓存键
pub mod user_keys;

// 限流计数键
pub mod rate_limit_keys;

pub use rate_limit_keys::rate_limit_key;
pub use user_keys::{USERS_COLLECTION, collection_list_key, generation_key};
