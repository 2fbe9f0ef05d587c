use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 用户数据库实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// 服务端分配，分配后不可变
    pub id: i64,
    pub name: String,
    /// 小写并去除首尾空白，集合内唯一
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// 待写入的新用户，字段已经过校验和清理
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

/// 部分更新，只修改提供的字段
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }

    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
    }
}

/// 邮箱统一为小写并去除首尾空白
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
