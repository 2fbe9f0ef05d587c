use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::user::{NewUser, User, UserChanges};
use crate::error::StoreError;
use crate::utils::with_timeout;

const EMAIL_CONFLICT: &str = "Email already exists";

/// 用户存储接口
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 连通性检查
    async fn ping(&self) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    /// 按邮箱查找，不区分大小写
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// 邮箱冲突时返回 StoreError::Conflict
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    /// 用户不存在时返回 None
    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError>;
    /// 返回是否确实删除了记录
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
    async fn count(&self) -> Result<i64, StoreError>;
}

/// PostgreSQL 用户存储
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// 创建 users 表（如果不存在）
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    name VARCHAR(100) NOT NULL,
                    email VARCHAR(100) NOT NULL UNIQUE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
            )
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// 唯一约束冲突转换为 Conflict，其余保持为数据库错误
fn map_write_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            StoreError::Conflict(EMAIL_CONFLICT.to_string())
        }
        other => other,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        with_timeout(self.timeout, sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, created_at FROM users ORDER BY id",
            )
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, created_at FROM users WHERE lower(email) = lower($1)",
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let created = with_timeout(
            self.timeout,
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (name, email)
                VALUES ($1, $2)
                RETURNING id, name, email, created_at
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(map_write_error)?;

        tracing::info!("User created: {}", created.email);
        Ok(created)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let updated = with_timeout(
            self.timeout,
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET name = COALESCE($1, name), email = COALESCE($2, email)
                WHERE id = $3
                RETURNING id, name, email, created_at
                "#,
            )
            .bind(changes.name)
            .bind(changes.email)
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(map_write_error)?;

        if updated.is_some() {
            tracing::info!("User updated: {}", id);
        }
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!("User deleted: {}", id);
        }
        Ok(deleted)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        with_timeout(
            self.timeout,
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users").fetch_one(&self.pool),
        )
        .await
    }
}
