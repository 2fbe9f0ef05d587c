use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

pub mod validation;

pub use validation::{parse_id, sanitize_input, validate_email, validate_name};

/// 为外部调用加上超时，超时视为存储故障
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
