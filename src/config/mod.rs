use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// 错误信息披露模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disclosure {
    /// 只返回通用错误信息
    Restricted,
    /// 返回完整错误详情
    Verbose,
}

impl FromStr for Disclosure {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restricted" | "generic" => Ok(Disclosure::Restricted),
            "verbose" | "full" => Ok(Disclosure::Verbose),
            _ => Err(()),
        }
    }
}

/// 限流档位：窗口内允许的最大请求数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTier {
    pub limit: u64,
    pub window: Duration,
}

impl RateTier {
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    pub const fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub const fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// 解析 "60 per minute"、"1000/hour" 或纯数字（使用默认窗口）
    pub fn parse(raw: &str, default_window: Duration) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let (count, unit) = match raw.split_once(" per ").or_else(|| raw.split_once('/')) {
            Some((count, unit)) => (count.trim(), Some(unit.trim())),
            None => (raw.as_str(), None),
        };

        let limit = count.parse::<u64>().ok()?;
        let window = match unit {
            None => default_window,
            Some(unit) => match unit.trim_end_matches('s') {
                "second" | "sec" => Duration::from_secs(1),
                "minute" | "min" => Duration::from_secs(60),
                "hour" => Duration::from_secs(3600),
                "day" => Duration::from_secs(86_400),
                _ => return None,
            },
        };

        Some(Self::new(limit, window))
    }

    /// 用于计数键和日志的标签，例如 "60/60s"
    pub fn label(&self) -> String {
        format!("{}/{}s", self.limit, self.window.as_secs())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_retries: u32,
    pub db_retry_interval_secs: u64,
    pub redis_url: String,
    pub rate_limit_storage_url: String,
    pub rate_limit_per_minute: RateTier,
    pub rate_limit_per_hour: RateTier,
    pub cors_origins: Vec<String>,
    pub instance_id: String,
    pub service_name: String,
    pub environment: String,
    pub disclosure: Disclosure,
    pub cache_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub max_body_bytes: usize,
    pub trust_proxy_headers: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，未设置的项使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let redis_url = get("REDIS_URL", "redis://redis:6379/0");
        let environment = get("ENVIRONMENT", "development");

        let disclosure = match lookup("ERROR_DISCLOSURE") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "ERROR_DISCLOSURE",
                value,
            })?,
            None if environment == "production" => Disclosure::Restricted,
            None => Disclosure::Verbose,
        };

        Ok(Config {
            server_host: get("SERVER_HOST", "0.0.0.0"),
            server_port: parsed(&lookup, "SERVER_PORT", 5000)?,
            database_url: get(
                "DATABASE_URL",
                "postgresql://app_user:app_secure_password@db:5432/userdb",
            ),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            db_connect_retries: parsed(&lookup, "DB_CONNECT_RETRIES", 30)?,
            db_retry_interval_secs: parsed(&lookup, "DB_RETRY_INTERVAL_SECS", 1)?,
            rate_limit_storage_url: lookup("RATE_LIMIT_STORAGE_URL")
                .unwrap_or_else(|| redis_url.clone()),
            redis_url,
            rate_limit_per_minute: tier(
                &lookup,
                "RATE_LIMIT_PER_MINUTE",
                RateTier::per_minute(60),
            )?,
            rate_limit_per_hour: tier(&lookup, "RATE_LIMIT_PER_HOUR", RateTier::per_hour(1000))?,
            cors_origins: get("CORS_ORIGINS", "http://localhost:8080")
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
            instance_id: get("INSTANCE_ID", "unknown"),
            service_name: get("SERVICE_NAME", "users"),
            environment,
            disclosure,
            cache_ttl_secs: parsed(&lookup, "CACHE_TTL_SECS", 60)?,
            store_timeout_ms: parsed(&lookup, "STORE_TIMEOUT_MS", 2000)?,
            max_body_bytes: parsed(&lookup, "MAX_BODY_BYTES", 1024 * 1024)?,
            trust_proxy_headers: parsed(&lookup, "TRUST_PROXY_HEADERS", false)?,
        })
    }

    /// 所有受保护路由共享的默认限流档位
    pub fn default_tiers(&self) -> Vec<RateTier> {
        vec![self.rate_limit_per_minute, self.rate_limit_per_hour]
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn db_retry_interval(&self) -> Duration {
        Duration::from_secs(self.db_retry_interval_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parsed<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn tier<F>(lookup: &F, key: &'static str, default: RateTier) -> Result<RateTier, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => {
            RateTier::parse(&value, default.window).ok_or(ConfigError::Invalid { key, value })
        }
        None => Ok(default),
    }
}
