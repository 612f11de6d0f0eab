// Typed store facade, one circuit breaker per CRUD primitive

use crate::core::errors::{BreakerError, StoreError};
use crate::core::models::{
    DeleteResult, InsertAck, SortOrder, TodoDocument, TodoFilter, TodoUpdate, UpdateResult,
};
use crate::core::resilience::{BreakerListener, CircuitBreaker, CircuitBreakerConfig};
use crate::core::traits::TodoCollection;
use std::sync::Arc;

pub const OP_FIND: &str = "find";
pub const OP_FIND_ONE: &str = "findOne";
pub const OP_INSERT_ONE: &str = "insertOne";
pub const OP_DELETE_ONE: &str = "deleteOne";
pub const OP_UPDATE_ONE: &str = "updateOne";

pub type GatewayResult<T> = Result<T, BreakerError<StoreError>>;

/// Store gateway
///
/// Every call is routed through the breaker owned by its operation type; the
/// breakers share no state. No retries happen here: recovery probing is left
/// entirely to the breakers' Half-Open trials.
pub struct StoreGateway {
    collection: Arc<dyn TodoCollection>,
    find: Arc<CircuitBreaker>,
    find_one: Arc<CircuitBreaker>,
    insert_one: Arc<CircuitBreaker>,
    delete_one: Arc<CircuitBreaker>,
    update_one: Arc<CircuitBreaker>,
}

impl StoreGateway {
    pub fn new(collection: Arc<dyn TodoCollection>, config: CircuitBreakerConfig) -> Self {
        Self::with_listeners(collection, config, Vec::new())
    }

    /// Build the gateway and attach `listeners` to every breaker
    pub fn with_listeners(
        collection: Arc<dyn TodoCollection>,
        config: CircuitBreakerConfig,
        listeners: Vec<Arc<dyn BreakerListener>>,
    ) -> Self {
        let build = |name: &str| {
            let breaker = listeners
                .iter()
                .cloned()
                .fold(CircuitBreaker::new(name, config.clone()), |cb, l| {
                    cb.with_listener(l)
                });
            Arc::new(breaker)
        };

        Self {
            find: build(OP_FIND),
            find_one: build(OP_FIND_ONE),
            insert_one: build(OP_INSERT_ONE),
            delete_one: build(OP_DELETE_ONE),
            update_one: build(OP_UPDATE_ONE),
            collection,
        }
    }

    /// Every document matching `filter`, through the `find` breaker
    ///
    /// # Returns
    /// * `GatewayResult<Vec<TodoDocument>>` - Documents, or the breaker's
    ///   verdict (`Open`, `Timeout`) or the store's error as `Inner`
    pub async fn find(&self, filter: &TodoFilter) -> GatewayResult<Vec<TodoDocument>> {
        self.find.invoke(|| self.collection.find(filter)).await
    }

    /// First document matching `filter` under `sort`, through the `findOne` breaker
    pub async fn find_one(
        &self,
        filter: &TodoFilter,
        sort: SortOrder,
    ) -> GatewayResult<Option<TodoDocument>> {
        self.find_one
            .invoke(|| self.collection.find_one(filter, sort))
            .await
    }

    /// Insert one document through the `insertOne` breaker
    ///
    /// A uniqueness violation comes back as `Inner(StoreError::Conflict)`.
    pub async fn insert_one(&self, document: &TodoDocument) -> GatewayResult<InsertAck> {
        self.insert_one
            .invoke(|| self.collection.insert_one(document))
            .await
    }

    pub async fn delete_one(&self, filter: &TodoFilter) -> GatewayResult<DeleteResult> {
        self.delete_one
            .invoke(|| self.collection.delete_one(filter))
            .await
    }

    pub async fn update_one(
        &self,
        filter: &TodoFilter,
        update: &TodoUpdate,
    ) -> GatewayResult<UpdateResult> {
        self.update_one
            .invoke(|| self.collection.update_one(filter, update))
            .await
    }

    /// All breakers, in operation order
    pub fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        vec![
            Arc::clone(&self.find),
            Arc::clone(&self.find_one),
            Arc::clone(&self.insert_one),
            Arc::clone(&self.delete_one),
            Arc::clone(&self.update_one),
        ]
    }

    /// True only when every breaker is Closed
    pub fn is_healthy(&self) -> bool {
        self.breakers().iter().all(|b| b.is_healthy())
    }
}
