// Response types for API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::core::errors::TodoError;

/// Body of `POST /todos` and `PUT /todos/:task_id`
#[derive(Debug, Deserialize)]
pub struct TodoContentRequest {
    pub content: String,
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// API error type that converts domain errors to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiError {
    /// Create an error that has no domain counterpart (framework rejections, timeouts)
    pub fn with_status(status: StatusCode, message: impl Into<String>, request_id: &str) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: Some(request_id.to_string()),
        }
    }

    /// Create from TodoError, tagging the response with the request's trace id
    pub fn from_todo_error_with_id(err: TodoError, request_id: &str) -> Self {
        let mut api_error = Self::from(err);
        api_error.request_id = Some(request_id.to_string());
        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            request_id: self.request_id,
        });
        (self.status, body).into_response()
    }
}

impl From<TodoError> for ApiError {
    fn from(err: TodoError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: err.user_message(),
            request_id: None,
        }
    }
}
