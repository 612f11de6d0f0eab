// Collaborator seams: durable store, cache, and pub/sub channel
//
// All implementations are shared process-wide behind Arc and must be Send + Sync.

use crate::core::errors::{CacheError, PublishError, StoreError};
use crate::core::models::{
    DeleteResult, InsertAck, SortOrder, TodoDocument, TodoFilter, TodoUpdate, UpdateResult,
};
use async_trait::async_trait;
use std::time::Duration;

/// Raw CRUD primitives of the durable todo collection
#[async_trait]
pub trait TodoCollection: Send + Sync {
    async fn find(&self, filter: &TodoFilter) -> Result<Vec<TodoDocument>, StoreError>;

    async fn find_one(
        &self,
        filter: &TodoFilter,
        sort: SortOrder,
    ) -> Result<Option<TodoDocument>, StoreError>;

    async fn insert_one(&self, document: &TodoDocument) -> Result<InsertAck, StoreError>;

    async fn delete_one(&self, filter: &TodoFilter) -> Result<DeleteResult, StoreError>;

    async fn update_one(
        &self,
        filter: &TodoFilter,
        update: &TodoUpdate,
    ) -> Result<UpdateResult, StoreError>;
}

/// String key/value cache with per-entry TTL
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Named pub/sub channel
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PublishError>;
}
