use chrono::Duration;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少必需的配置项: {0}")]
    Missing(&'static str),

    #[error("配置项 {key} 的值无效: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

// 登录尝试限制配置
#[derive(Debug, Clone)]
pub struct LoginAttemptConfig {
    pub max_attempts: u32,
    pub block_duration: Duration,
    pub window: Duration,
}

// 全局限流配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub burst: u32,
    /// 仅作为配置项保留，限流逻辑只按窗口内的突发上限拦截
    pub requests_per_second: u32,
    pub window: Duration,
    pub block_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub login: LoginAttemptConfig,
    pub rate_limit: RateLimitConfig,
    pub cors_allowed_origins: Vec<String>,
    pub environment: String,
    pub csp_img_hosts: Vec<String>,
    pub csp_connect_hosts: Vec<String>,
    pub bcrypt_cost: u32,
    pub log_file: String,
    pub log_level: String,
    pub sweep_interval: Duration,
}

const MIN_SECRET_LEN: usize = 32;
const DEFAULT_STORAGE_HOSTS: &str = "https://firebasestorage.googleapis.com https://storage.googleapis.com";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        // 签名密钥缺失或过短时直接拒绝启动
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                value: format!("长度 {} 小于 {}", jwt_secret.len(), MIN_SECRET_LEN),
            });
        }

        let login = LoginAttemptConfig {
            max_attempts: parse_or(&lookup, "LOGIN_MAX_ATTEMPTS", 5)?,
            block_duration: Duration::seconds(parse_or(&lookup, "LOGIN_BLOCK_SECONDS", 300)?),
            window: Duration::seconds(parse_or(&lookup, "LOGIN_ATTEMPT_WINDOW_SECONDS", 300)?),
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_or(&lookup, "RATE_LIMIT_ENABLED", true)?,
            burst: parse_or(&lookup, "RATE_LIMIT_BURST", 20)?,
            requests_per_second: parse_or(&lookup, "RATE_LIMIT_REQUESTS_PER_SECOND", 10)?,
            window: Duration::seconds(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 60)?),
            block_duration: Duration::seconds(parse_or(&lookup, "RATE_LIMIT_BLOCK_SECONDS", 30)?),
        };

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        Ok(AppConfig {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            store_backend,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            token_ttl: Duration::seconds(parse_or(&lookup, "JWT_TTL_SECONDS", 86_400)?),
            login,
            rate_limit,
            cors_allowed_origins: split_list(
                &lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:3000".to_string()),
            ),
            environment: lookup("APP_ENV").unwrap_or_else(|| "production".to_string()),
            csp_img_hosts: split_list(
                &lookup("CSP_IMG_HOSTS").unwrap_or_else(|| DEFAULT_STORAGE_HOSTS.to_string()),
            ),
            csp_connect_hosts: split_list(
                &lookup("CSP_CONNECT_HOSTS").unwrap_or_else(|| DEFAULT_STORAGE_HOSTS.to_string()),
            ),
            bcrypt_cost,
            log_file: lookup("LOG_FILE").unwrap_or_else(|| "logs/app.log".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),
            sweep_interval: Duration::seconds(parse_or(&lookup, "SWEEP_INTERVAL_SECONDS", 60)?),
        })
    }

    /// 开发环境下不下发 HSTS
    pub fn is_development(&self) -> bool {
        matches!(
            self.environment.to_ascii_lowercase().as_str(),
            "development" | "dev" | "local"
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw })
        }
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "STORE_BACKEND" => Some("memory".to_string()),
        "JWT_SECRET" => Some("test-secret-that-is-long-enough-for-hs256".to_string()),
        "APP_ENV" => Some("test".to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        _ => None,
    })
    .expect("测试配置无效")
}
