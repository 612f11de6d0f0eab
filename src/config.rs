// Configuration management

use crate::core::errors::TodoError;
use crate::core::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Which cache collaborator backs the cache-aside layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    fn parse(value: &str) -> Result<Self, TodoError> {
        match value.to_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(TodoError::Configuration(format!(
                "Invalid CACHE_BACKEND '{}': must be 'redis' or 'memory'",
                other
            ))),
        }
    }
}

/// Application configuration loaded from environment variables
///
/// All configuration is validated on load with clear error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Redis configuration (cache + log channel)
    pub redis_url: String,
    pub redis_channel: String,
    pub redis_connection_timeout_secs: u64,
    pub redis_operation_timeout_ms: u64,

    // Database configuration
    pub database_url: String,
    pub db_max_connections: u32,

    // Cache configuration
    pub cache_backend: CacheBackend,
    pub cache_ttl_secs: u64,
    pub cache_max_capacity: u64,

    // Store protection
    pub circuit_breaker: CircuitBreakerConfig,

    // Header carrying the authenticated principal, set by the auth collaborator
    pub principal_header: String,

    // Middleware configuration
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, TodoError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok();
        }

        let circuit_breaker = CircuitBreakerConfig {
            timeout: Duration::from_millis(Self::parse_u64_or_default("CB_TIMEOUT_MS", 5_000)?),
            error_threshold_percentage: Self::parse_percentage_or_default(
                "CB_ERROR_THRESHOLD_PERCENTAGE",
                50,
            )?,
            reset_timeout: Duration::from_millis(Self::parse_u64_or_default(
                "CB_RESET_TIMEOUT_MS",
                30_000,
            )?),
            rolling_count_timeout: Duration::from_millis(Self::parse_u64_or_default(
                "CB_ROLLING_WINDOW_MS",
                10_000,
            )?),
            rolling_count_buckets: Self::parse_u32_or_default("CB_ROLLING_BUCKETS", 10)?,
            volume_threshold: Self::parse_u32_or_default("CB_VOLUME_THRESHOLD", 1)?,
        };

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0"),
            port: Self::parse_port()?,
            redis_url: Self::get_env_or_default("REDIS_URL", "redis://localhost:6379"),
            redis_channel: Self::get_env_or_default("REDIS_CHANNEL", "log_channel"),
            redis_connection_timeout_secs: Self::parse_u64_or_default(
                "REDIS_CONNECTION_TIMEOUT_SECS",
                10,
            )?,
            redis_operation_timeout_ms: Self::parse_u64_or_default(
                "REDIS_OPERATION_TIMEOUT_MS",
                1_000,
            )?,
            database_url: Self::get_env_or_default(
                "DATABASE_URL",
                "postgres://localhost:5432/todosdb",
            ),
            db_max_connections: Self::parse_u32_or_default("DB_MAX_CONNECTIONS", 10)?,
            cache_backend: CacheBackend::parse(&Self::get_env_or_default("CACHE_BACKEND", "redis"))?,
            cache_ttl_secs: Self::parse_u64_or_default("CACHE_TTL_SECS", 300)?,
            cache_max_capacity: Self::parse_u64_or_default("CACHE_MAX_CAPACITY", 10_000)?,
            circuit_breaker,
            principal_header: Self::get_env_or_default("PRINCIPAL_HEADER", "x-authenticated-user")
                .to_lowercase(),
            request_timeout_secs: Self::parse_u64_or_default("REQUEST_TIMEOUT_SECS", 30)?,
            body_size_limit_bytes: Self::parse_usize_or_default("BODY_SIZE_LIMIT_BYTES", 1024 * 1024)?,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "json"),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Get environment variable or return default value
    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Parse port from TODO_API_PORT environment variable
    fn parse_port() -> Result<u16, TodoError> {
        let port_str = env::var("TODO_API_PORT").unwrap_or_else(|_| "8082".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            TodoError::Configuration(format!("Invalid TODO_API_PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(TodoError::Configuration(
                "TODO_API_PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    /// Parse a strictly positive number from an environment variable or return default
    fn parse_positive_or_default<T>(key: &str, default: T) -> Result<T, TodoError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.trim().parse::<T>().map_err(|e| {
                    TodoError::Configuration(format!("Invalid {} value '{}': {}", key, value, e))
                })?;

                if parsed == T::default() {
                    return Err(TodoError::Configuration(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, TodoError> {
        Self::parse_positive_or_default(key, default)
    }

    fn parse_u32_or_default(key: &str, default: u32) -> Result<u32, TodoError> {
        Self::parse_positive_or_default(key, default)
    }

    fn parse_usize_or_default(key: &str, default: usize) -> Result<usize, TodoError> {
        Self::parse_positive_or_default(key, default)
    }

    fn parse_percentage_or_default(key: &str, default: u8) -> Result<u8, TodoError> {
        let value = Self::parse_positive_or_default(key, default)?;
        if value > 100 {
            return Err(TodoError::Configuration(format!(
                "{} must be between 1 and 100",
                key
            )));
        }
        Ok(value)
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), TodoError> {
        Self::validate_url(&self.redis_url, "Redis URL")?;
        Self::validate_url(&self.database_url, "Database URL")?;

        if self.redis_channel.trim().is_empty() {
            return Err(TodoError::Configuration(
                "REDIS_CHANNEL must not be empty".to_string(),
            ));
        }

        if self.principal_header.trim().is_empty() {
            return Err(TodoError::Configuration(
                "PRINCIPAL_HEADER must not be empty".to_string(),
            ));
        }

        self.circuit_breaker.validate()?;

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    /// Validate URL format
    fn validate_url(url: &str, description: &str) -> Result<(), TodoError> {
        url::Url::parse(url).map_err(|e| {
            TodoError::Configuration(format!("Invalid {} '{}': {}", description, url, e))
        })?;
        Ok(())
    }

    /// Validate log level
    fn validate_log_level(level: &str) -> Result<(), TodoError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(TodoError::Configuration(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate log format
    fn validate_log_format(format: &str) -> Result<(), TodoError> {
        if format != "json" && format != "text" {
            return Err(TodoError::Configuration(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Create a test configuration
    ///
    /// Bypasses environment variable loading and validation.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8082,
            redis_url: "redis://localhost:6379".to_string(),
            redis_channel: "log_channel".to_string(),
            redis_connection_timeout_secs: 10,
            redis_operation_timeout_ms: 1_000,
            database_url: "postgres://localhost:5432/todosdb".to_string(),
            db_max_connections: 10,
            cache_backend: CacheBackend::Memory,
            cache_ttl_secs: 300,
            cache_max_capacity: 10_000,
            circuit_breaker: CircuitBreakerConfig::default(),
            principal_header: "x-authenticated-user".to_string(),
            request_timeout_secs: 30,
            body_size_limit_bytes: 1024 * 1024,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
