// Request handlers for API endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use tracing::{error, info};

use crate::api::middleware::{JsonBody, RequestContext};
use crate::api::responses::{ApiError, TodoContentRequest};
use crate::api::AppState;
use crate::core::errors::TodoError;
use crate::core::health::HealthReport;
use crate::core::models::TodoItem;

/// GET /todos
pub async fn list_todos_handler(
    State(app_state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<TodoItem>>, ApiError> {
    let items = app_state
        .store
        .list(&ctx.principal)
        .await
        .map_err(|e| ApiError::from_todo_error_with_id(e, &ctx.trace_id))?;

    Ok(Json(items))
}

/// POST /todos
pub async fn create_todo_handler(
    State(app_state): State<AppState>,
    ctx: RequestContext,
    JsonBody(request): JsonBody<TodoContentRequest>,
) -> Result<Json<TodoItem>, ApiError> {
    let content = validate_content(&request.content, &ctx.trace_id)?;

    let item = app_state
        .store
        .create(&ctx.principal, content, &ctx.trace_id)
        .await
        .map_err(|e| ApiError::from_todo_error_with_id(e, &ctx.trace_id))?;

    info!(
        principal = %ctx.principal,
        id = item.id,
        trace_id = %ctx.trace_id,
        "Todo created"
    );
    Ok(Json(item))
}

/// PUT /todos/:task_id
pub async fn update_todo_handler(
    State(app_state): State<AppState>,
    ctx: RequestContext,
    Path(task_id): Path<String>,
    JsonBody(request): JsonBody<TodoContentRequest>,
) -> Result<Json<TodoItem>, ApiError> {
    let id = parse_task_id(&task_id, &ctx.trace_id)?;
    let content = validate_content(&request.content, &ctx.trace_id)?;

    let item = app_state
        .store
        .update(&ctx.principal, id, content, &ctx.trace_id)
        .await
        .map_err(|e| ApiError::from_todo_error_with_id(e, &ctx.trace_id))?;

    Ok(Json(item))
}

/// DELETE /todos/:task_id
///
/// Answers 204 with an empty body once the item is gone.
pub async fn delete_todo_handler(
    State(app_state): State<AppState>,
    ctx: RequestContext,
    Path(task_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_task_id(&task_id, &ctx.trace_id)?;

    app_state
        .store
        .delete(&ctx.principal, id, &ctx.trace_id)
        .await
        .map_err(|e| ApiError::from_todo_error_with_id(e, &ctx.trace_id))?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
///
/// Always 200; a degraded store shows up in the body only.
pub async fn health_handler(State(app_state): State<AppState>) -> Json<HealthReport> {
    Json(app_state.health.report())
}

/// GET /metrics
///
/// Prometheus text exposition format.
pub async fn metrics_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    match app_state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            ApiError::from(e).into_response()
        }
    }
}

fn validate_content<'a>(content: &'a str, trace_id: &str) -> Result<&'a str, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::from_todo_error_with_id(
            TodoError::Validation("content must not be blank".to_string()),
            trace_id,
        ));
    }
    Ok(content)
}

fn parse_task_id(task_id: &str, trace_id: &str) -> Result<i64, ApiError> {
    task_id.parse::<i64>().map_err(|_| {
        ApiError::from_todo_error_with_id(
            TodoError::Validation(format!("task id '{}' is not a number", task_id)),
            trace_id,
        )
    })
}
