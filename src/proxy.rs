use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::models::wandb_models_to_openai;
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse, ModelListResponse};
use crate::translate::request::build_upstream_request;
use crate::translate::response::wandb_to_openai;
use crate::translate::streaming::{SseFrame, SseTranscoder};
use crate::translate::wandb_types::{WandbChatResponse, WandbModelList};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use std::convert::Infallible;
use std::pin::Pin;

/// Outcome of an upstream call: a translated payload, or the upstream's own
/// non-success reply to relay untouched.
pub enum ProxyResult<T> {
    Success(T),
    Upstream(UpstreamReply),
}

/// A non-success upstream reply, kept byte-for-byte.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: Bytes,
}

/// Client-facing SSE bytes. Never yields an error: read failures end the stream.
pub type SseByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, Infallible>> + Send>>;

pub enum ChatReply {
    Completion(ChatCompletionResponse),
    Stream(SseByteStream),
}

/// Forward a chat completion request to W&B.
///
/// `upstream_auth` is the full `Authorization` header value. Streaming is decided
/// by the client's `stream` flag.
pub async fn chat_completion(
    req: &ChatCompletionRequest,
    upstream_auth: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ProxyResult<ChatReply>> {
    let url = config.upstream_url("/chat/completions");
    let wandb_req = build_upstream_request(req, &config.translation.default_system_prompt);
    let streaming = req.stream.unwrap_or(false);

    logger.info(
        "proxy",
        format!(
            "POST {} model={} messages={}{}",
            url,
            wandb_req.model,
            wandb_req.messages.len(),
            if streaming { " (streaming)" } else { "" }
        ),
    );

    let response = client
        .post(&url)
        .header(AUTHORIZATION, upstream_auth)
        .header(USER_AGENT, &config.upstream.user_agent)
        .json(&wandb_req)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        return Ok(ProxyResult::Upstream(capture_reply(response, logger).await?));
    }

    if streaming {
        let stream = transcode_stream(response.bytes_stream(), req.model.clone(), logger.clone());
        return Ok(ProxyResult::Success(ChatReply::Stream(Box::pin(stream))));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to read response body: {}", e)))?;

    let wandb_resp: WandbChatResponse = serde_json::from_slice(&body).map_err(|e| {
        ProxyError::upstream(format!(
            "Failed to parse upstream response: {}. Body: {}",
            e,
            truncate(&String::from_utf8_lossy(&body), 300)
        ))
    })?;

    let resp = wandb_to_openai(&wandb_resp, &req.model);

    logger.log_with_context(
        LogLevel::Info,
        "proxy",
        "Completed",
        serde_json::json!({
            "model": resp.model,
            "choices": resp.choices.len(),
            "prompt_tokens": resp.usage.prompt_tokens,
            "completion_tokens": resp.usage.completion_tokens,
        }),
    );

    Ok(ProxyResult::Success(ChatReply::Completion(resp)))
}

/// Fetch the W&B model catalog and translate it.
pub async fn list_models(
    upstream_auth: &str,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ProxyResult<ModelListResponse>> {
    let url = config.upstream_url("/models");
    logger.info("proxy", format!("GET {}", url));

    let response = client
        .get(&url)
        .header(AUTHORIZATION, upstream_auth)
        .header(USER_AGENT, &config.upstream.user_agent)
        .send()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to fetch models: {}", e)))?;

    if !response.status().is_success() {
        return Ok(ProxyResult::Upstream(capture_reply(response, logger).await?));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to read models response: {}", e)))?;
    let catalog: WandbModelList = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::upstream(format!("Failed to parse models response: {}", e)))?;

    let models = wandb_models_to_openai(catalog.data.as_deref().unwrap_or_default());
    logger.debug("proxy", format!("Listed {} models", models.data.len()));

    Ok(ProxyResult::Success(models))
}

/// Re-frame an upstream SSE byte stream into OpenAI SSE bytes.
///
/// Frames are yielded one by one as the consumer polls, so the upstream is only
/// read as fast as the client accepts output. Dropping the returned stream drops
/// the upstream body and releases the connection.
pub fn transcode_stream<S, E>(
    byte_stream: S,
    model: String,
    logger: SharedLogger,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut transcoder = SseTranscoder::new(&model);
        let mut sent = 0usize;
        let mut skipped = 0usize;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    logger.error("stream", format!("Upstream read error: {}", e));
                    break;
                }
            };

            for frame in transcoder.feed(&chunk) {
                match frame {
                    SseFrame::Skipped { line, error } => {
                        skipped += 1;
                        logger.warn(
                            "stream",
                            format!("Skipping unparseable event: {} ({})", error, truncate(&line, 200)),
                        );
                    }
                    other => {
                        if let Some(bytes) = other.to_bytes() {
                            sent += 1;
                            yield Ok(bytes);
                        }
                    }
                }
            }
        }

        // Tolerate an upstream that ends on "data: [DONE]" without a newline
        if let Some(bytes) = transcoder.finish().and_then(|f| f.to_bytes()) {
            sent += 1;
            yield Ok(bytes);
        }

        logger.info(
            "stream",
            format!("Stream completed model={} frames={} skipped={}", model, sent, skipped),
        );
    }
}

async fn capture_reply(response: reqwest::Response, logger: &SharedLogger) -> Result<UpstreamReply> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::upstream(format!("Failed to read upstream error body: {}", e)))?;

    logger.warn(
        "proxy",
        format!(
            "Upstream returned status {}: {}",
            status,
            truncate(&String::from_utf8_lossy(&body), 300)
        ),
    );

    Ok(UpstreamReply {
        status,
        headers,
        body,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
