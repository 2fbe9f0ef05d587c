use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::User;
use crate::error::AppError;

/// 列表数据的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Cache,
    Database,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub data: Vec<User>,
    pub source: DataSource,
}

/// 创建/更新请求体；字段保持原始 JSON 值，交给处理器校验类型和格式
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
}

impl UserPayload {
    /// 请求体为空、不是 JSON 对象或是空对象时返回 "No data provided"
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::validation("No data provided"));
        }

        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) if !map.is_empty() => {
                serde_json::from_value(Value::Object(map))
                    .map_err(|_| AppError::validation("Invalid JSON body"))
            }
            Ok(_) => Err(AppError::validation("No data provided")),
            Err(_) => Err(AppError::validation("Invalid JSON body")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_non_object_bodies() {
        let bodies: [&[u8]; 6] = [b"", b"  ", b"{}", b"[]", b"null", b"42"];
        for body in bodies {
            let err = UserPayload::from_body(body).unwrap_err();
            assert_eq!(err.to_string(), "No data provided");
        }
        let err = UserPayload::from_body(b"{not json").unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON body");
    }

    #[test]
    fn keeps_raw_field_values() {
        let payload = UserPayload::from_body(br#"{"name": 7, "extra": true}"#).unwrap();
        assert_eq!(payload.name, Some(Value::from(7)));
        assert!(payload.email.is_none());
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DataSource::Cache).unwrap(),
            r#""cache""#
        );
    }
}
