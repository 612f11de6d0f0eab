// Cache-aside reads and write-around mutations over the store gateway

use crate::core::errors::TodoError;
use crate::core::metrics::Metrics;
use crate::core::models::{
    LogEvent, OperationKind, SortOrder, TodoDocument, TodoFilter, TodoItem, TodoUpdate,
};
use crate::core::traits::CacheClient;
use crate::infra::event_publisher::EventPublisher;
use crate::state::gateway::StoreGateway;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default lifetime of a cached list
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key of a principal's full item list
pub fn list_key(principal: &str) -> String {
    format!("todos:user:{}", principal)
}

/// Cache key reserved for single items; not populated yet
pub fn item_key(principal: &str, id: i64) -> String {
    format!("todo:{}:{}", principal, id)
}

/// Data-access layer for todo items
///
/// Reads try the cache first and repopulate it from the store on a miss.
/// Mutations go to the store only and then invalidate the principal's list
/// entry; the list entry is written exclusively by the read path. Cache faults
/// never fail an operation.
pub struct CacheAsideStore {
    gateway: Arc<StoreGateway>,
    cache: Arc<dyn CacheClient>,
    publisher: Arc<EventPublisher>,
    ttl: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl CacheAsideStore {
    pub fn new(
        gateway: Arc<StoreGateway>,
        cache: Arc<dyn CacheClient>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            gateway,
            cache,
            publisher,
            ttl: DEFAULT_CACHE_TTL,
            metrics: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// All items of `principal`, ascending by id
    ///
    /// Serves `todos:user:<principal>` when present (an empty list is a hit);
    /// otherwise reads the store through the `find` breaker and populates the
    /// entry with the configured TTL. Cache faults degrade to a store read.
    ///
    /// # Arguments
    /// * `principal` - Authenticated owner of the items
    ///
    /// # Returns
    /// * `Result<Vec<TodoItem>, TodoError>` - Items collapsed by id, or
    ///   `ServiceUnavailable` when the store is down or the breaker is open
    pub async fn list(&self, principal: &str) -> Result<Vec<TodoItem>, TodoError> {
        let key = list_key(principal);
        debug!(principal, "LIST operation");

        if let Some(items) = self.get_from_cache(&key).await {
            debug!(principal, count = items.len(), "Returning cached todos");
            return Ok(items);
        }

        let documents = self
            .gateway
            .find(&TodoFilter::by_principal(principal))
            .await
            .map_err(|e| {
                error!(principal, error = %e, "Failed to list todos from store");
                TodoError::from(e)
            })?;

        let items = collapse_by_id(&documents);
        debug!(principal, count = items.len(), "Fetched todos from store");

        self.set_cache(&key, &items).await;
        Ok(items)
    }

    /// Store a new item under the next free identifier of `principal`
    ///
    /// The identifier is the principal's current maximum plus one (1 for a
    /// first item). After the insert commits, the principal's list entry is
    /// invalidated and a `CREATE` event is published in the background.
    ///
    /// # Arguments
    /// * `principal` - Authenticated owner of the new item
    /// * `content` - Item text, already validated by the caller
    /// * `trace_id` - Request trace id carried into the published event
    ///
    /// # Returns
    /// * `Result<TodoItem, TodoError>` - The stored item, `ServiceUnavailable`
    ///   on store failure, or `Internal` when another writer took the identifier
    pub async fn create(
        &self,
        principal: &str,
        content: &str,
        trace_id: &str,
    ) -> Result<TodoItem, TodoError> {
        // Not atomic: concurrent creates for one principal can read the same
        // maximum. The store's (username, id) key rejects the loser.
        let last = self
            .gateway
            .find_one(&TodoFilter::by_principal(principal), SortOrder::IdDescending)
            .await
            .map_err(|e| {
                error!(principal, error = %e, "Failed to read last todo id");
                TodoError::from(e)
            })?;
        let next_id = last.map_or(1, |doc| doc.id + 1);

        let document = TodoDocument::new(principal, next_id, content);
        self.gateway.insert_one(&document).await.map_err(|e| {
            error!(principal, id = next_id, error = %e, "Failed to insert todo");
            TodoError::from(e)
        })?;
        info!(principal, id = next_id, "Inserted todo");

        self.invalidate_principal(principal).await;
        self.publisher
            .publish(LogEvent::new(OperationKind::Create, principal, next_id, trace_id));

        Ok(TodoItem::from(&document))
    }

    /// Remove one item
    ///
    /// # Arguments
    /// * `principal` - Authenticated owner of the item
    /// * `id` - Identifier within the principal's items
    /// * `trace_id` - Request trace id carried into the published event
    ///
    /// # Returns
    /// * `Result<(), TodoError>` - `NotFound` when nothing matched, in which
    ///   case neither the cache nor the event channel is touched
    pub async fn delete(&self, principal: &str, id: i64, trace_id: &str) -> Result<(), TodoError> {
        let result = self
            .gateway
            .delete_one(&TodoFilter::by_id(principal, id))
            .await
            .map_err(|e| {
                error!(principal, id, error = %e, "Failed to delete todo");
                TodoError::from(e)
            })?;

        if result.deleted_count == 0 {
            debug!(principal, id, "Todo not found for deletion");
            return Err(TodoError::NotFound);
        }
        info!(principal, id, "Deleted todo");

        self.invalidate_principal(principal).await;
        self.publisher
            .publish(LogEvent::new(OperationKind::Delete, principal, id, trace_id));

        Ok(())
    }

    /// Replace the content of one item
    pub async fn update(
        &self,
        principal: &str,
        id: i64,
        content: &str,
        trace_id: &str,
    ) -> Result<TodoItem, TodoError> {
        let update = TodoUpdate {
            content: content.to_string(),
        };
        let result = self
            .gateway
            .update_one(&TodoFilter::by_id(principal, id), &update)
            .await
            .map_err(|e| {
                error!(principal, id, error = %e, "Failed to update todo");
                TodoError::from(e)
            })?;

        if result.matched_count == 0 {
            debug!(principal, id, "Todo not found for update");
            return Err(TodoError::NotFound);
        }
        info!(principal, id, "Updated todo");

        self.invalidate_principal(principal).await;
        self.publisher
            .publish(LogEvent::new(OperationKind::Update, principal, id, trace_id));

        Ok(TodoItem {
            id,
            content: update.content,
        })
    }

    /// Drop the principal's list entry after a committed write
    async fn invalidate_principal(&self, principal: &str) {
        debug!(principal, "Invalidating cache after write");
        self.delete_from_cache(&list_key(principal)).await;
    }

    /// Cache read; any fault or unreadable payload is a miss
    async fn get_from_cache(&self, key: &str) -> Option<Vec<TodoItem>> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<TodoItem>>(&payload) {
                Ok(items) => {
                    debug!(key, "Cache HIT");
                    self.record("get", "hit");
                    Some(items)
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding unreadable cache payload");
                    self.record("get", "error");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Cache MISS");
                self.record("get", "miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache GET failed, falling back to store");
                self.record("get", "error");
                None
            }
        }
    }

    async fn set_cache(&self, key: &str, items: &[TodoItem]) {
        let payload = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize todos for cache");
                self.record("set", "error");
                return;
            }
        };

        match self.cache.set_with_ttl(key, &payload, self.ttl).await {
            Ok(()) => {
                debug!(key, ttl_secs = self.ttl.as_secs(), "Cached todos");
                self.record("set", "ok");
            }
            Err(e) => {
                warn!(key, error = %e, "Cache SET failed");
                self.record("set", "error");
            }
        }
    }

    async fn delete_from_cache(&self, key: &str) {
        match self.cache.delete(key).await {
            Ok(()) => {
                debug!(key, "Deleted cache entry");
                self.record("invalidate", "ok");
            }
            Err(e) => {
                warn!(key, error = %e, "Cache DEL failed");
                self.record("invalidate", "error");
            }
        }
    }

    fn record(&self, operation: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache(operation, outcome);
        }
    }
}

/// Reduce store records to one item per id; later records win
fn collapse_by_id(documents: &[TodoDocument]) -> Vec<TodoItem> {
    documents
        .iter()
        .map(|doc| (doc.id, TodoItem::from(doc)))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}
