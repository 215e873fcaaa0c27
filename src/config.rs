/*
 * Responsibility
 * - 環境変数や設定の読み込み (CLIENTS_FILE, request_uri の timeout など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::request_object::FetchPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // JSON client registry (client_id -> request_object_signing_alg + keys)
    pub clients_file: PathBuf,

    // Applied to the connect phase and to the response phase separately.
    pub request_uri_timeout: Duration,
    pub request_uri_max_body_bytes: usize,
    pub request_object_leeway_seconds: u64,

    pub http_body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Separated from `from_env` so parsing can be tested without touching the
    // process environment.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = get("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let clients_file = get("CLIENTS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("CLIENTS_FILE"))?;

        let timeout_ms: u64 = parse_or(&get, "REQUEST_URI_TIMEOUT_MS", 1500)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid("REQUEST_URI_TIMEOUT_MS"));
        }

        let request_uri_max_body_bytes = parse_or(&get, "REQUEST_URI_MAX_BODY_BYTES", 64 * 1024)?;
        let request_object_leeway_seconds = parse_or(&get, "REQUEST_OBJECT_LEEWAY_SECONDS", 60)?;
        let http_body_limit_bytes = parse_or(&get, "HTTP_BODY_LIMIT_BYTES", 64 * 1024)?;

        Ok(Self {
            addr,
            app_env,
            clients_file,
            request_uri_timeout: Duration::from_millis(timeout_ms),
            request_uri_max_body_bytes,
            request_object_leeway_seconds,
            http_body_limit_bytes,
        })
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            connect_timeout: self.request_uri_timeout,
            response_timeout: self.request_uri_timeout,
            max_body_bytes: self.request_uri_max_body_bytes,
        }
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
