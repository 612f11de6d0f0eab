// Redis connection and cache client

use crate::core::errors::{CacheError, TodoError};
use crate::core::traits::CacheClient;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY_MS: u64 = 1000;

/// Open a Redis connection manager shared by the cache and the event channel
///
/// Retries with linear backoff (3 attempts) and verifies each connection with
/// PING before handing it out.
pub async fn connect(redis_url: &str, timeout: Duration) -> Result<ConnectionManager, TodoError> {
    let mut connection_errors = Vec::new();

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay_ms = INITIAL_DELAY_MS * attempt as u64;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match try_connect(redis_url, timeout).await {
            Ok(mut manager) => match ping(&mut manager).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!("Redis connection succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    connection_errors.push(format!("Connection created but ping failed: {}", e));
                }
            },
            Err(e) => {
                if attempt < MAX_RETRIES - 1 {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES,
                        error = %e,
                        "Redis connection attempt failed, retrying..."
                    );
                }
                connection_errors.push(format!("Attempt {} failed: {}", attempt + 1, e));
            }
        }
    }

    Err(TodoError::Configuration(format!(
        "Failed to create Redis connection to {} after {} attempts: {}",
        redis_url,
        MAX_RETRIES,
        connection_errors.join("; ")
    )))
}

async fn try_connect(redis_url: &str, timeout: Duration) -> Result<ConnectionManager, CacheError> {
    let client = Client::open(redis_url).map_err(|e| {
        CacheError::Connection(format!("Invalid Redis URL format '{}': {}", redis_url, e))
    })?;

    tokio::time::timeout(timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| {
            CacheError::Connection(format!(
                "Redis ConnectionManager creation timed out after {:?}",
                timeout
            ))
        })?
        .map_err(|e| CacheError::Connection(format!("Failed to create Redis ConnectionManager: {}", e)))
}

async fn ping(conn: &mut ConnectionManager) -> Result<(), CacheError> {
    let result: String = redis::cmd("PING")
        .query_async(conn)
        .await
        .map_err(|e| CacheError::Connection(format!("Redis ping failed: {}", e)))?;

    if result == "PONG" {
        Ok(())
    } else {
        Err(CacheError::Connection(format!(
            "Redis ping returned unexpected response: {}",
            result
        )))
    }
}

/// Redis-backed cache client
///
/// Every command is bounded by `operation_timeout` so a stalled Redis degrades
/// to a cache miss instead of holding the request.
pub struct RedisCache {
    connection_manager: ConnectionManager,
    operation_timeout: Duration,
}

impl RedisCache {
    pub fn new(connection_manager: ConnectionManager, operation_timeout: Duration) -> Self {
        Self {
            connection_manager,
            operation_timeout,
        }
    }

    async fn bounded<T, F>(&self, command: &str, fut: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| {
                CacheError::Connection(format!(
                    "Redis {} timed out after {:?}",
                    command, self.operation_timeout
                ))
            })?
            .map_err(|e| CacheError::Command(format!("Redis {} failed: {}", command, e)))
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection_manager.clone();
        self.bounded("GET", conn.get::<_, Option<String>>(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        let seconds = ttl.as_secs().max(1);
        self.bounded("SETEX", conn.set_ex::<_, _, ()>(key, value, seconds))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection_manager.clone();
        self.bounded("DEL", conn.del::<_, i64>(key))
            .await
            .map(|_removed| ())
    }
}
