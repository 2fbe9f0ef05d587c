use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::database::models::user::{NewUser, User, UserChanges};
use crate::database::repositories::user::UserStore;
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

/// 进程内用户存储，语义与 PgUserStore 一致（自增 ID、邮箱唯一）
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("Email already exists".to_string()));
        }

        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            name: user.name,
            email: user.email,
            created_at: Utc::now(),
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &changes.email {
            if inner.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict("Email already exists".to_string()));
            }
        }

        Ok(inner.users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.users.remove(&id).is_some())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.inner.read().await.users.len() as i64)
    }
}
