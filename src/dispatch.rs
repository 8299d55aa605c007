//! The request pipeline behind POST /v1/chat/completions.
//!
//! READ -> VALIDATE -> [COMPRESS] -> DEDUP_CHECK -> ROUTE ->
//! DISPATCH(model_i) -> stream back, capturing for the dedup cache.
//!
//! Fallback only happens before the first body byte is forwarded: the
//! upstream status is known before streaming starts, so a failed attempt
//! never leaks partial bytes to the client. Once streaming has begun, an
//! upstream error terminates the stream and fails the in-flight entry.

use crate::compression::message::NormalizedMessage;
use crate::compression::{should_compress, CompressionPipeline};
use crate::config::{Config, RoutingProfile};
use crate::dedup::{CachedResponse, DedupCache, Lookup, MAX_BODY_SIZE};
use crate::error::{error_body, ProxyError};
use crate::router::{RouteOptions, Router, RoutingDecision};
use crate::selector::Selector;
use crate::state::{AppState, RequestLog};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_MESSAGES: usize = 200;
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 1024;

/// Headers never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "accept-encoding",
];

pub async fn handle_chat(state: AppState, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();
    let mut log = RequestLog::new("");

    let response = match process(&state, &headers, body, &mut log).await {
        Ok(response) => response,
        Err(err) => {
            log.error_message = Some(err.to_string());
            err.into_response()
        }
    };

    let status = response.status();
    log.status_code = Some(status.as_u16());
    log.status = if status.is_success() {
        "success".to_string()
    } else if status.is_client_error() {
        "rejected".to_string()
    } else {
        "error".to_string()
    };
    log.duration_ms = started.elapsed().as_millis() as u64;
    state.add_log(log).await;

    response
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
    log: &mut RequestLog,
) -> Result<Response, ProxyError> {
    let config = state.get_config().await;
    let limit_bytes = config.dispatch.max_request_size_kb * 1024;

    // 1-2. Size gate and shape validation, before any payment activity.
    if body.len() > limit_bytes {
        return Err(ProxyError::RequestTooLarge {
            limit_kb: config.dispatch.max_request_size_kb,
        });
    }
    let mut request = validate(&body)?;
    let requested_model = request_model(&request)?.to_string();
    log.requested_model = requested_model.clone();

    // 3. Compression for large payloads.
    let mut upstream_body = body;
    if config.dispatch.auto_compress_requests
        && upstream_body.len() > config.dispatch.compression_threshold_kb * 1024
    {
        if let Some(saved) = compress_in_place(&mut request, &config) {
            log.compression_saved_chars = Some(saved);
            upstream_body = Bytes::from(
                serde_json::to_vec(&request)
                    .map_err(|e| ProxyError::Internal(e.to_string()))?,
            );
        }
        if upstream_body.len() > limit_bytes {
            return Err(ProxyError::RequestTooLarge {
                limit_kb: config.dispatch.max_request_size_kb,
            });
        }
    }

    // 4. Dedup probe on the post-compression canonical body.
    let key = DedupCache::key(&upstream_body);
    let mut guard = match state.dedup.lookup(&key) {
        Lookup::Hit(cached) => {
            log.cache_status = Some("hit".to_string());
            tracing::debug!(key = %key, "dedup cache hit");
            return Ok(cached_response(cached));
        }
        Lookup::Pending(rx) => {
            log.cache_status = Some("coalesced".to_string());
            tracing::debug!(key = %key, "joining in-flight request");
            let cached = rx.await.map_err(|_| ProxyError::DedupOriginFailed)?;
            return Ok(cached_response(cached));
        }
        Lookup::Miss => InflightGuard::new(state.dedup.clone(), key.clone()),
    };
    log.cache_status = Some("miss".to_string());

    // 5. Route.
    let max_output_tokens = request
        .get("max_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);
    let decision = route_request(&config, &request, &requested_model, max_output_tokens)?;
    log.served_model = Some(decision.model.clone());
    log.tier = Some(decision.tier.as_str().to_string());
    log.score = Some(decision.score);
    log.confidence = Some(decision.confidence);
    log.cost_estimate = Some(decision.cost_estimate);
    log.savings = Some(decision.savings);

    let estimated_input_tokens = (upstream_body.len() / 4) as u64;

    // 6. Fallback loop.
    let mut last_error: Option<(u16, Bytes)> = None;
    let attempts: Vec<&String> = decision
        .chain
        .iter()
        .take(config.dispatch.max_fallback_attempts)
        .collect();

    for model in attempts {
        log.models_tried.push(model.clone());
        match attempt_upstream(
            state,
            &config,
            headers,
            &request,
            model,
            estimated_input_tokens,
            max_output_tokens,
        )
        .await?
        {
            Attempt::Success(upstream) => {
                guard.disarm();
                return Ok(stream_through(state.dedup.clone(), key, upstream));
            }
            Attempt::Retryable { status, body } => {
                tracing::warn!(model = %model, status, "upstream attempt failed, trying next");
                last_error = Some((status, body));
            }
            Attempt::Fatal { status, body } => {
                // Non-retryable upstream rejection: pass it through as-is.
                // The guard drops armed and fails the in-flight entry so
                // waiters can retry.
                return Ok(passthrough_error(status, body));
            }
        }
    }

    // 8. Emergency fallback to the designated free model, one attempt.
    let emergency = config.emergency_model.clone();
    if !emergency.is_empty() && !log.models_tried.contains(&emergency) {
        log.models_tried.push(emergency.clone());
        tracing::warn!(model = %emergency, "fallback chain exhausted, trying emergency model");
        if let Attempt::Success(upstream) = attempt_upstream(
            state,
            &config,
            headers,
            &request,
            &emergency,
            estimated_input_tokens,
            max_output_tokens,
        )
        .await?
        {
            guard.disarm();
            return Ok(stream_through(state.dedup.clone(), key, upstream));
        }
    }

    // Guard drops armed on return, waking waiters with the retry failure.
    let (status, body) = last_error.unwrap_or_else(|| {
        (
            502,
            Bytes::from(error_body("all upstream models failed", "exhausted").to_string()),
        )
    });
    Err(ProxyError::Exhausted { status, body })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(body: &[u8]) -> Result<Value, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ProxyError::BadRequest("request body is not valid JSON".into()))?;

    if !value.is_object() {
        return Err(ProxyError::BadRequest(
            "request body must be a JSON object".into(),
        ));
    }

    let messages = value
        .get("messages")
        .ok_or_else(|| ProxyError::BadRequest("missing messages array".into()))?;
    let messages = messages
        .as_array()
        .ok_or_else(|| ProxyError::BadRequest("messages must be an array".into()))?;
    if messages.is_empty() || messages.len() > MAX_MESSAGES {
        return Err(ProxyError::BadRequest(format!(
            "messages must contain between 1 and {} entries",
            MAX_MESSAGES
        )));
    }

    if let Some(max_tokens) = value.get("max_tokens") {
        if !max_tokens.is_null() && max_tokens.as_u64().is_none() {
            return Err(ProxyError::BadRequest(
                "max_tokens must be a non-negative integer".into(),
            ));
        }
    }

    Ok(value)
}

fn request_model(request: &Value) -> Result<&str, ProxyError> {
    request
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("missing model field".into()))
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Run the pipeline over the request's messages, in place. Returns
/// characters saved, or None when the payload was left untouched (small
/// payload, or messages that do not fit the normalized shape).
fn compress_in_place(request: &mut Value, config: &Config) -> Option<usize> {
    let raw = request.get("messages")?.as_array()?.clone();

    let mut normalized: Vec<NormalizedMessage> = Vec::with_capacity(raw.len());
    for message in &raw {
        match serde_json::from_value::<NormalizedMessage>(message.clone()) {
            Ok(msg) => normalized.push(msg),
            // Multimodal or otherwise unusual shapes: skip the whole pass
            // rather than compress half a transcript.
            Err(_) => return None,
        }
    }

    if !should_compress(&normalized, config.compression.min_payload_bytes) {
        return None;
    }

    let pipeline = CompressionPipeline::new(config.compression.clone());
    let outcome = pipeline.compress(normalized);
    let saved = outcome
        .chars_before
        .saturating_sub(outcome.chars_after);

    let new_messages: Vec<Value> = outcome
        .messages
        .iter()
        .filter_map(|m| serde_json::to_value(m).ok())
        .collect();
    request["messages"] = Value::Array(new_messages);

    Some(saved)
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

fn route_request(
    config: &Config,
    request: &Value,
    requested_model: &str,
    max_output_tokens: u64,
) -> Result<RoutingDecision, ProxyError> {
    if let Some(profile) = RoutingProfile::from_model(requested_model) {
        let prompt = last_user_text(request);
        let system = system_text(request);
        return Ok(Router::route(
            config,
            &prompt,
            system.as_deref(),
            max_output_tokens,
            RouteOptions {
                profile: Some(profile),
                agentic: None,
            },
        ));
    }

    let input_tokens = (serde_json::to_string(request).map(|s| s.len()).unwrap_or(0) / 4) as u64;
    Router::route_explicit(config, requested_model, input_tokens, max_output_tokens).ok_or_else(
        || ProxyError::BadRequest(format!("unknown model '{}'", requested_model)),
    )
}

/// Text of the last user message; handles string and array-style content.
fn last_user_text(request: &Value) -> String {
    let Some(messages) = request.get("messages").and_then(Value::as_array) else {
        return String::new();
    };
    for message in messages.iter().rev() {
        if message.get("role").and_then(Value::as_str) != Some("user") {
            continue;
        }
        return content_text(message.get("content"));
    }
    String::new()
}

fn system_text(request: &Value) -> Option<String> {
    let messages = request.get("messages").and_then(Value::as_array)?;
    messages
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("system"))
        .map(|m| content_text(m.get("content")))
}

fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => {
            let mut out = Vec::new();
            for part in parts {
                if part.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        out.push(text.to_string());
                    }
                }
            }
            out.join("\n")
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Upstream attempts
// ---------------------------------------------------------------------------

enum Attempt {
    Success(reqwest::Response),
    Retryable { status: u16, body: Bytes },
    Fatal { status: u16, body: Bytes },
}

async fn attempt_upstream(
    state: &AppState,
    config: &Config,
    client_headers: &HeaderMap,
    request: &Value,
    model: &str,
    estimated_input_tokens: u64,
    max_output_tokens: u64,
) -> Result<Attempt, ProxyError> {
    // Identical body except for the substituted model.
    let mut upstream_request = request.clone();
    upstream_request["model"] = Value::String(model.to_string());
    let body = serde_json::to_vec(&upstream_request)
        .map_err(|e| ProxyError::Internal(e.to_string()))?;

    let amount =
        Selector::cost_of(config, model, estimated_input_tokens, max_output_tokens);
    let payment = state
        .signer
        .sign(amount)
        .await
        .map_err(|e| ProxyError::Internal(format!("payment signing failed: {}", e)))?;

    let mut headers = forwardable_headers(client_headers);
    headers.insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(&payment) {
        headers.insert(HeaderName::from_static("x-payment"), value);
    }

    let timeout = Duration::from_secs(config.dispatch.upstream_timeout_seconds);
    let send = state
        .http
        .post(&config.upstream_url)
        .headers(headers)
        .body(body)
        .send();

    let response = match tokio::time::timeout(timeout, send).await {
        Err(_) => {
            return Ok(Attempt::Retryable {
                status: 504,
                body: Bytes::from(
                    error_body("upstream attempt timed out", "upstream_timeout").to_string(),
                ),
            });
        }
        Ok(Err(err)) => {
            return Ok(Attempt::Retryable {
                status: 502,
                body: Bytes::from(
                    error_body(&err.to_string(), "upstream_network").to_string(),
                ),
            });
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(Attempt::Success(response));
    }

    let body = response.bytes().await.unwrap_or_default();
    if is_retryable(status, &body) {
        Ok(Attempt::Retryable { status, body })
    } else {
        Ok(Attempt::Fatal { status, body })
    }
}

/// Billing, rate-limit, size and server-side failures move to the next
/// model; anything else is the upstream's final word.
fn is_retryable(status: u16, body: &[u8]) -> bool {
    if matches!(status, 402 | 413 | 429) || status >= 500 {
        return true;
    }
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(kind) = value
            .get("error")
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
        {
            return matches!(
                kind,
                "provider_error" | "insufficient_funds" | "billing_error"
            );
        }
    }
    false
}

fn forwardable_headers(client_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in client_headers {
        if HOP_BY_HOP.contains(&name.as_str()) || name.as_str() == "content-type" {
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }
    headers
}

// ---------------------------------------------------------------------------
// Response plumbing
// ---------------------------------------------------------------------------

/// Forward the upstream response chunk-by-chunk while buffering up to
/// MAX_BODY_SIZE for the dedup cache. SSE heartbeats flush as they arrive;
/// nothing is reordered or held back.
///
/// If the client disconnects mid-stream the upstream is drained to
/// completion anyway so waiters and retries get the cached response.
fn stream_through(
    dedup: Arc<DedupCache>,
    key: String,
    upstream: reqwest::Response,
) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);

    let mut response_headers = HeaderMap::new();
    let mut cache_headers: Vec<(String, String)> = Vec::new();
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        response_headers.insert(name.clone(), value.clone());
        if let Ok(v) = value.to_str() {
            cache_headers.push((name.to_string(), v.to_string()));
        }
    }

    let (mut tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);

    tokio::spawn(async move {
        let status_code = status.as_u16();
        let mut captured: Vec<u8> = Vec::new();
        let mut overflow = false;
        let mut failed = false;

        let mut stream = upstream.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if !overflow {
                        if captured.len() + bytes.len() <= MAX_BODY_SIZE {
                            captured.extend_from_slice(&bytes);
                        } else {
                            overflow = true;
                            captured.clear();
                        }
                    }
                    // A send error means the client went away; keep
                    // draining so the cache entry still completes.
                    let _ = tx.send(Ok(bytes)).await;
                }
                Err(err) => {
                    failed = true;
                    tracing::warn!(key = %key, error = %err, "upstream stream failed mid-body");
                    let _ = tx.send(Err(std::io::Error::other(err))).await;
                    break;
                }
            }
        }

        if failed || overflow {
            dedup.remove_inflight(&key);
        } else {
            dedup.complete(
                &key,
                CachedResponse::new(status_code, cache_headers, Bytes::from(captured)),
            );
        }
    });

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        *headers = response_headers;
    }
    builder
        .body(Body::from_stream(rx))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Replay a cached or coalesced response.
fn cached_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    for (name, value) in &cached.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn passthrough_error(status: u16, body: Bytes) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Fails the in-flight dedup entry unless the request reached a successful
/// dispatch. Covers every early return and panic in the pipeline.
struct InflightGuard {
    dedup: Arc<DedupCache>,
    key: String,
    armed: bool,
}

impl InflightGuard {
    fn new(dedup: Arc<DedupCache>, key: String) -> Self {
        Self {
            dedup,
            key,
            armed: true,
        }
    }

    /// Responsibility for the entry has moved to the streaming task.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.dedup.remove_inflight(&self.key);
        }
    }
}
