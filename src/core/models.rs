// Domain models for todo items and the events emitted around them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted todo document, one per (username, id)
///
/// Identifiers are unique within a principal's set only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDocument {
    pub id: i64,
    pub content: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl TodoDocument {
    pub fn new(username: &str, id: i64, content: &str) -> Self {
        Self {
            id,
            content: content.to_string(),
            username: username.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Public item shape returned by list/create/update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    pub content: String,
}

impl From<&TodoDocument> for TodoItem {
    fn from(doc: &TodoDocument) -> Self {
        Self {
            id: doc.id,
            content: doc.content.clone(),
        }
    }
}

/// Store filter: all of a principal's items, or one of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoFilter {
    pub username: String,
    pub id: Option<i64>,
}

impl TodoFilter {
    pub fn by_principal(username: &str) -> Self {
        Self {
            username: username.to_string(),
            id: None,
        }
    }

    pub fn by_id(username: &str, id: i64) -> Self {
        Self {
            username: username.to_string(),
            id: Some(id),
        }
    }

    pub fn matches(&self, doc: &TodoDocument) -> bool {
        doc.username == self.username && self.id.map_or(true, |id| doc.id == id)
    }
}

/// Sort applied to single-record lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    IdAscending,
    IdDescending,
}

/// Fields replaced by an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoUpdate {
    pub content: String,
}

/// Write acknowledgement for inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertAck {
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Kind of committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Create,
    Delete,
    Update,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "CREATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Update => "UPDATE",
        };
        f.write_str(s)
    }
}

/// Record of a committed mutation, published once to the log channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "zipkinSpan")]
    pub trace_id: String,
    #[serde(rename = "opName")]
    pub op_name: OperationKind,
    pub username: String,
    #[serde(rename = "todoId")]
    pub todo_id: i64,
}

impl LogEvent {
    pub fn new(op_name: OperationKind, username: &str, todo_id: i64, trace_id: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            op_name,
            username: username.to_string(),
            todo_id,
        }
    }
}
