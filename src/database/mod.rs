// 数据库模块
// 包含用户实体定义、存储接口及其实现

use std::time::Duration;

pub mod models; // 数据库实体定义
pub mod repositories; // 存储接口与实现

// 重新导出常用类型，方便其他模块使用
pub use models::user::{NewUser, User, UserChanges, normalize_email};
pub use repositories::memory::MemoryUserStore;
pub use repositories::user::{PgUserStore, UserStore};

use crate::error::StoreError;

/// 启动时等待数据库可用，超过最大重试次数后返回最后一次的错误
pub async fn wait_for_db(
    store: &dyn UserStore,
    max_retries: u32,
    interval: Duration,
) -> Result<(), StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.ping().await {
            Ok(()) => {
                tracing::info!("Database connection established!");
                return Ok(());
            }
            Err(e) if attempt >= max_retries => {
                tracing::error!("Database unreachable after {} attempts: {}", attempt, e);
                return Err(e);
            }
            Err(e) => {
                tracing::info!("Waiting for database... ({}/{}): {}", attempt, max_retries, e);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 n 次 ping 失败
    struct FlakyStore {
        failures_left: AtomicU32,
        pings: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                pings: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl UserStore for FlakyStore {
        async fn ping(&self) -> Result<(), StoreError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Timeout(Duration::from_millis(1)));
            }
            Ok(())
        }
        async fn list(&self) -> Result<Vec<User>, StoreError> {
            Ok(vec![])
        }
        async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
            unimplemented!()
        }
        async fn update(&self, _id: i64, _c: UserChanges) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _id: i64) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn count(&self) -> Result<i64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_reachable() {
        let store = FlakyStore::new(3);
        wait_for_db(&store, 30, Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.pings.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let store = FlakyStore::new(100);
        assert!(wait_for_db(&store, 5, Duration::from_secs(1)).await.is_err());
        assert_eq!(store.pings.load(Ordering::SeqCst), 5);
    }
}
