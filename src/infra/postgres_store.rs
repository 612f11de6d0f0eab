// PostgreSQL-backed todo collection

use crate::core::errors::StoreError;
use crate::core::models::{
    DeleteResult, InsertAck, SortOrder, TodoDocument, TodoFilter, TodoUpdate, UpdateResult,
};
use crate::core::traits::TodoCollection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::info;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    username TEXT NOT NULL,
    id BIGINT NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (username, id)
)";

/// Database row structure for todo lookups
#[derive(FromRow)]
struct TodoRow {
    username: String,
    id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<TodoRow> for TodoDocument {
    fn from(row: TodoRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

/// Durable todo store
///
/// `(username, id)` is the primary key, so duplicate identifiers for one
/// principal are rejected with `StoreError::Conflict`.
pub struct PostgresTodoCollection {
    db_pool: PgPool,
}

impl PostgresTodoCollection {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Open a pool against `database_url`
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let db_pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self::new(db_pool))
    }

    /// Create the todos table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.db_pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("Todos schema ready");
        Ok(())
    }
}

#[async_trait]
impl TodoCollection for PostgresTodoCollection {
    async fn find(&self, filter: &TodoFilter) -> Result<Vec<TodoDocument>, StoreError> {
        let rows = sqlx::query_as::<_, TodoRow>(
            "SELECT username, id, content, created_at
             FROM todos
             WHERE username = $1 AND ($2::BIGINT IS NULL OR id = $2)
             ORDER BY id",
        )
        .bind(&filter.username)
        .bind(filter.id)
        .fetch_all(&self.db_pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TodoDocument::from).collect())
    }

    async fn find_one(
        &self,
        filter: &TodoFilter,
        sort: SortOrder,
    ) -> Result<Option<TodoDocument>, StoreError> {
        let query = match sort {
            SortOrder::IdAscending => {
                "SELECT username, id, content, created_at
                 FROM todos
                 WHERE username = $1 AND ($2::BIGINT IS NULL OR id = $2)
                 ORDER BY id ASC
                 LIMIT 1"
            }
            SortOrder::IdDescending => {
                "SELECT username, id, content, created_at
                 FROM todos
                 WHERE username = $1 AND ($2::BIGINT IS NULL OR id = $2)
                 ORDER BY id DESC
                 LIMIT 1"
            }
        };

        let row = sqlx::query_as::<_, TodoRow>(query)
            .bind(&filter.username)
            .bind(filter.id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TodoDocument::from))
    }

    async fn insert_one(&self, document: &TodoDocument) -> Result<InsertAck, StoreError> {
        sqlx::query(
            "INSERT INTO todos (username, id, content, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&document.username)
        .bind(document.id)
        .bind(&document.content)
        .bind(document.created_at)
        .execute(&self.db_pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(InsertAck { acknowledged: true })
    }

    async fn delete_one(&self, filter: &TodoFilter) -> Result<DeleteResult, StoreError> {
        let result = sqlx::query(
            "DELETE FROM todos
             WHERE ctid IN (
                 SELECT ctid FROM todos
                 WHERE username = $1 AND ($2::BIGINT IS NULL OR id = $2)
                 LIMIT 1
             )",
        )
        .bind(&filter.username)
        .bind(filter.id)
        .execute(&self.db_pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(DeleteResult {
            deleted_count: result.rows_affected(),
        })
    }

    async fn update_one(
        &self,
        filter: &TodoFilter,
        update: &TodoUpdate,
    ) -> Result<UpdateResult, StoreError> {
        let result = sqlx::query(
            "UPDATE todos SET content = $3
             WHERE ctid IN (
                 SELECT ctid FROM todos
                 WHERE username = $1 AND ($2::BIGINT IS NULL OR id = $2)
                 LIMIT 1
             )",
        )
        .bind(&filter.username)
        .bind(filter.id)
        .bind(&update.content)
        .execute(&self.db_pool)
        .await
        .map_err(map_sqlx_error)?;

        let affected = result.rows_affected();
        Ok(UpdateResult {
            matched_count: affected,
            modified_count: affected,
        })
    }
}

/// Split sqlx failures into connection-class and query-class store errors
fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::Decode(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}
