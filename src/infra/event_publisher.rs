// Post-commit mutation events on a pub/sub channel

use crate::core::errors::PublishError;
use crate::core::models::LogEvent;
use crate::core::traits::EventChannel;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on one background delivery attempt
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Fire-and-forget publisher for committed mutations
///
/// Delivery failures are logged and dropped: never retried, never surfaced to
/// the operation that produced the event. Each delivery task lives at most
/// `publish_timeout`, so a stalled channel cannot accumulate pending tasks.
pub struct EventPublisher {
    channel: Arc<dyn EventChannel>,
    channel_name: String,
    publish_timeout: Duration,
}

impl EventPublisher {
    pub fn new(channel: Arc<dyn EventChannel>, channel_name: impl Into<String>) -> Self {
        Self {
            channel,
            channel_name: channel_name.into(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Hand `event` to the channel on a background task
    ///
    /// Returns immediately; the caller never observes the delivery outcome.
    ///
    /// # Arguments
    /// * `event` - The committed mutation, serialized as the `LogEvent` wire shape
    ///
    /// Must only be called after the mutation has committed to the store. A
    /// delivery that fails or outlives the publish timeout is logged at WARN
    /// and dropped.
    pub fn publish(&self, event: LogEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, op = %event.op_name, "Failed to serialize log event");
                return;
            }
        };

        let channel = Arc::clone(&self.channel);
        let channel_name = self.channel_name.clone();
        let publish_timeout = self.publish_timeout;

        tokio::spawn(async move {
            let delivery =
                tokio::time::timeout(publish_timeout, channel.publish(&channel_name, &payload));
            match delivery.await {
                Ok(Ok(())) => debug!(
                    channel = %channel_name,
                    op = %event.op_name,
                    principal = %event.username,
                    todo_id = event.todo_id,
                    trace_id = %event.trace_id,
                    "Published log event"
                ),
                Ok(Err(e)) => warn!(
                    error = %e,
                    op = %event.op_name,
                    principal = %event.username,
                    todo_id = event.todo_id,
                    "Failed to publish log event"
                ),
                Err(_) => warn!(
                    channel = %channel_name,
                    op = %event.op_name,
                    principal = %event.username,
                    todo_id = event.todo_id,
                    timeout_ms = publish_timeout.as_millis() as u64,
                    "Log event publish timed out, dropping event"
                ),
            }
        });
    }
}

/// Redis PUBLISH channel sharing the process-wide connection manager
///
/// Every PUBLISH is bounded by `operation_timeout`, like the cache commands.
pub struct RedisEventChannel {
    connection_manager: ConnectionManager,
    operation_timeout: Duration,
}

impl RedisEventChannel {
    pub fn new(connection_manager: ConnectionManager, operation_timeout: Duration) -> Self {
        Self {
            connection_manager,
            operation_timeout,
        }
    }
}

#[async_trait]
impl EventChannel for RedisEventChannel {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PublishError> {
        let mut conn = self.connection_manager.clone();
        let command = conn.publish::<_, _, i64>(channel, payload);

        match tokio::time::timeout(self.operation_timeout, command).await {
            Ok(Ok(_receivers)) => Ok(()),
            Ok(Err(e)) => Err(PublishError {
                channel: channel.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(PublishError {
                channel: channel.to_string(),
                reason: format!("Redis PUBLISH timed out after {:?}", self.operation_timeout),
            }),
        }
    }
}
