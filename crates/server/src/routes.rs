//! HTTP endpoints.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    middleware,
    response::sse::{Event, Sse},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};
use relia_core::{Error, HealthResponse, QueryRequest};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::rate_limit::{rate_limit_middleware, SlidingWindowRateLimiter};
use crate::state::AppState;

/// Build the application router with auth, rate limiting, and tracing.
pub fn create_router(state: AppState) -> Router {
    let limiter = Arc::new(SlidingWindowRateLimiter::new());

    Router::new()
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .route("/traces/recent", get(recent_traces))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(Extension(limiter))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
        .with_state(state)
}

/// Attach a request id and log request timing.
async fn request_id_middleware(
    request: axum::extract::Request,
    next: middleware::Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = format!("{duration_ms:.2}").as_str(),
        request_id = %request_id,
        "request completed"
    );
    response
}

fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /query`
async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    match state.pipeline.execute(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

/// `POST /query/stream` - Server-Sent Events.
async fn query_stream(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.pipeline.clone().execute_stream(request).map(|event| {
        // SSE data fields reject carriage returns; LLM fragments may carry
        // them on some platforms.
        let event = match event {
            relia_pipeline::StreamEvent::Token(text) => {
                Event::default().event("token").data(text.replace('\r', ""))
            }
            relia_pipeline::StreamEvent::Metadata(response) => Event::default()
                .event("metadata")
                .data(serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())),
            relia_pipeline::StreamEvent::Done => Event::default().event("done").data(""),
            relia_pipeline::StreamEvent::Error(message) => Event::default()
                .event("error")
                .data(message.replace(['\r', '\n'], " ")),
        };
        Ok(event)
    });
    Sse::new(events)
}

/// `POST /ingest` - multipart upload: a `file` part plus an optional
/// `metadata` part carrying a JSON object.
async fn ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut filename = None;
    let mut bytes = None;
    let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(|s| s.to_string());
                match field.bytes().await {
                    Ok(data) => bytes = Some(data),
                    Err(e) => {
                        return (StatusCode::BAD_REQUEST, format!("unreadable file part: {e}"))
                            .into_response()
                    }
                }
            }
            Some("metadata") => {
                let raw = field.text().await.unwrap_or_default();
                match serde_json::from_str(&raw) {
                    Ok(parsed) => metadata = parsed,
                    Err(_) => {
                        return (StatusCode::BAD_REQUEST, "Invalid metadata JSON".to_string())
                            .into_response()
                    }
                }
            }
            _ => {}
        }
    }

    let (Some(filename), Some(bytes)) = (filename, bytes) else {
        return (StatusCode::BAD_REQUEST, "missing file part".to_string()).into_response();
    };

    match state.ingest.ingest_bytes(&filename, &bytes, metadata).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ingest failed");
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let doc_count = state.chunk_store.count_documents().await.unwrap_or(0);
    let chunk_count = state.chunk_store.count_chunks().await.unwrap_or(0);
    Json(HealthResponse {
        status: "ok".to_string(),
        doc_count,
        chunk_count,
        index_size: state.vector_index.size() as u64,
    })
}

#[derive(Debug, Deserialize)]
struct RecentTracesParams {
    #[serde(default = "default_trace_limit")]
    limit: usize,
}

fn default_trace_limit() -> usize {
    100
}

/// `GET /traces/recent?limit=N` - diagnostic read of persisted traces.
async fn recent_traces(
    State(state): State<AppState>,
    Query(params): Query<RecentTracesParams>,
) -> impl IntoResponse {
    match state.trace_store.recent_traces(params.limit.min(1000)).await {
        Ok(traces) => Json(traces).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "trace read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
