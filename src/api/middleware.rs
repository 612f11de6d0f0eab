// Per-request context and HTTP tracing

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    BoxError, Json,
};
use serde::de::DeserializeOwned;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, warn, Level};

use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::core::errors::TodoError;

const TRACE_ID_HEADER: &str = "x-b3-traceid";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller identity and trace id of one request
///
/// The principal is asserted by the authentication collaborator in front of
/// this service through the configured header; requests without it are
/// rejected with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: String,
    pub trace_id: String,
}

/// Trace id from the B3 header, else the request id, else a fresh UUID v4
pub fn extract_trace_id(headers: &HeaderMap) -> String {
    [TRACE_ID_HEADER, REQUEST_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let trace_id = extract_trace_id(&parts.headers);

        let principal = parts
            .headers
            .get(state.config.principal_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        match principal {
            Some(principal) => Ok(Self { principal, trace_id }),
            None => {
                debug!(trace_id = %trace_id, "Request without authenticated principal");
                Err(ApiError::from_todo_error_with_id(
                    TodoError::Unauthenticated(format!(
                        "missing {} header",
                        state.config.principal_header
                    )),
                    &trace_id,
                ))
            }
        }
    }
}

/// JSON request body whose rejections answer with the standard error body
///
/// Missing or malformed JSON, a wrong content type and an absent `content`
/// field all keep axum's status code (400, 415 or 422) but are rendered as
/// `{error, request_id}`.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = extract_trace_id(req.headers());

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(
                    trace_id = %trace_id,
                    status = rejection.status().as_u16(),
                    error = %rejection.body_text(),
                    "Rejected request body"
                );
                Err(ApiError::with_status(
                    rejection.status(),
                    body_rejection_message(&rejection),
                    &trace_id,
                ))
            }
        }
    }
}

fn body_rejection_message(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "Invalid request: expected a JSON body",
        JsonRejection::JsonDataError(_) => "Invalid request: body must carry a string 'content'",
        _ => "Invalid request: malformed JSON body",
    }
}

/// Maps errors raised by the tower middleware stack to the standard error body
///
/// Runs under `HandleErrorLayer`; an elapsed request timeout becomes 408.
pub async fn handle_middleware_error(headers: HeaderMap, err: BoxError) -> ApiError {
    let trace_id = extract_trace_id(&headers);

    if err.is::<tower::timeout::error::Elapsed>() {
        warn!(trace_id = %trace_id, "Request timed out");
        return ApiError::with_status(StatusCode::REQUEST_TIMEOUT, "Request timed out", &trace_id);
    }

    ApiError::from_todo_error_with_id(TodoError::Internal(err.to_string()), &trace_id)
}

/// Tracing middleware
///
/// Logs method, path, status and latency of every request at INFO.
pub fn tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
