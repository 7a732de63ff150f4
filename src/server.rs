use crate::auth::resolve_upstream_auth;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::proxy::{self, ChatReply, ProxyResult, UpstreamReply};
use crate::translate::openai_types::ChatCompletionRequest;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::any::Any as PanicPayload;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, USER_AGENT]);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(catch_panic_layer())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub type PanicHandler = fn(Box<dyn PanicPayload + Send + 'static>) -> Response;

/// Turns a panic inside a handler into a 500 `server_error` body instead of a dropped connection.
pub fn catch_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    tracing::error!(detail, "Handler panicked");
    ProxyError::other("Internal server error").into_response()
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match chat_completions(&state, &headers, &body).await {
        Ok(resp) => resp,
        Err(e) => {
            state.logger.warn("server", format!("Chat completion rejected: {}", e));
            e.into_response()
        }
    }
}

async fn chat_completions(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response> {
    let upstream_auth = resolve_upstream_auth(header_str(headers, AUTHORIZATION), &state.config)?;
    let req = parse_chat_request(header_str(headers, CONTENT_TYPE), body)?;
    let is_streaming = req.stream.unwrap_or(false);

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={} prompt={}",
            req.model,
            is_streaming,
            req.messages.len(),
            req.prompt.is_some()
        ),
    );

    let outcome =
        proxy::chat_completion(&req, &upstream_auth, &state.config, &state.client, &state.logger)
            .await?;

    Ok(match outcome {
        ProxyResult::Upstream(reply) => relay_response(reply),
        ProxyResult::Success(ChatReply::Completion(resp)) => {
            ([(CACHE_CONTROL, "no-cache")], Json(resp)).into_response()
        }
        ProxyResult::Success(ChatReply::Stream(stream)) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .header("x-accel-buffering", "no")
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::other(format!("Failed to build stream response: {}", e)))?,
    })
}

/// Validate and decode a chat completion body. Runs before any upstream call.
pub fn parse_chat_request(content_type: Option<&str>, body: &[u8]) -> Result<ChatCompletionRequest> {
    if !content_type.is_some_and(|ct| ct.contains("application/json")) {
        return Err(ProxyError::unsupported_media_type(
            "Unsupported Media Type, expected application/json",
        ));
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ProxyError::invalid_request("Invalid JSON"))?;

    let has_model = value
        .get("model")
        .and_then(|m| m.as_str())
        .is_some_and(|m| !m.is_empty());
    if !has_model {
        return Err(ProxyError::invalid_request("Missing required field: model"));
    }

    let has_messages = value
        .get("messages")
        .and_then(|m| m.as_array())
        .is_some_and(|m| !m.is_empty());
    let has_prompt = value
        .get("prompt")
        .and_then(|p| p.as_str())
        .is_some_and(|p| !p.is_empty());
    if !has_messages && !has_prompt {
        return Err(ProxyError::invalid_request("Missing messages or prompt field"));
    }

    serde_json::from_value(value)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid request body: {}", e)))
}

async fn handle_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match models(&state, &headers).await {
        Ok(resp) => resp,
        Err(e) => {
            state.logger.warn("server", format!("Model list failed: {}", e));
            e.into_response()
        }
    }
}

async fn models(state: &AppState, headers: &HeaderMap) -> Result<Response> {
    let upstream_auth = resolve_upstream_auth(header_str(headers, AUTHORIZATION), &state.config)?;
    let outcome =
        proxy::list_models(&upstream_auth, &state.config, &state.client, &state.logger).await?;

    Ok(match outcome {
        ProxyResult::Success(models) => {
            let cache = format!("public, max-age={}", state.config.models.cache_max_age_secs);
            ([(CACHE_CONTROL, cache)], Json(models)).into_response()
        }
        ProxyResult::Upstream(reply) => relay_response(reply),
    })
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Pass a non-success upstream reply through with its own status, headers and body.
fn relay_response(reply: UpstreamReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (key, value) in reply.headers.iter() {
        if is_hop_header(key.as_str()) {
            continue;
        }
        if let Ok(name) = HeaderName::from_bytes(key.as_str().as_bytes()) {
            if let Ok(val) = HeaderValue::from_bytes(value.as_bytes()) {
                headers.append(name, val);
            }
        }
    }
    response
}

fn is_hop_header(name: &str) -> bool {
    matches!(name, "connection" | "transfer-encoding" | "content-length" | "keep-alive")
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
