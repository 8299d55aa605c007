use blockrun_router::config::Config;
use blockrun_router::state::AppState;
use blockrun_router::wallet::LocalWalletSigner;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

// Throwaway key; anvil's well-known second dev account.
const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Standard OpenAI-style success response with token usage.
fn openai_success_body() -> Value {
    json!({
        "id": "chatcmpl-test123",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Hello from mock!"
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 5,
            "total_tokens": 15
        }
    })
}

/// Minimal chat completion request body.
fn chat_request(model: &str, content: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": content}],
        "max_tokens": 50
    })
}

/// Config pointed at the given mock upstream.
fn test_config(upstream: &str) -> Config {
    Config {
        upstream_url: upstream.to_string(),
        ..Config::default()
    }
}

fn make_state(config: Config) -> AppState {
    let signer = LocalWalletSigner::from_key(TEST_KEY).expect("test key is valid");
    AppState::new(config, Arc::new(signer))
}

/// Spawn the app on an ephemeral loopback port and return its address.
async fn spawn_app(state: AppState) -> std::net::SocketAddr {
    let app = blockrun_router::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

async fn mock_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Happy path and routing
// ---------------------------------------------------------------------------

/// model=auto routes a trivial prompt to the cheap simple-tier primary and
/// passes the upstream response through untouched.
#[tokio::test]
async fn test_auto_routes_simple_prompt() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let config = test_config(&server.uri());
    let simple_primary = config.auto.tiers.simple.primary.clone();
    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello from mock!");

    // Exactly one upstream call, with the model substituted.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let upstream_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream_body["model"], simple_primary);

    let logs = state.get_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "success");
    assert!(matches!(logs[0].tier.as_deref(), Some("simple") | Some("medium")));
    assert_eq!(logs[0].cache_status.as_deref(), Some("miss"));
}

/// Every upstream dispatch carries a signed X-Payment header.
#[tokio::test]
async fn test_payment_header_attached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header_exists("x-payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    // The mock only matches when the header is present.
    assert_eq!(resp.status(), 200);
}

/// An explicit provider-qualified model bypasses classification but is
/// dispatched with that exact model id.
#[tokio::test]
async fn test_explicit_model_dispatched_verbatim() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("openai/gpt-5.2-codex", "Hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let requests = server.received_requests().await.unwrap();
    let upstream_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream_body["model"], "openai/gpt-5.2-codex");
}

/// premium profile picks the premium-tier primary and reports zero savings.
#[tokio::test]
async fn test_premium_profile_zero_savings() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let config = test_config(&server.uri());
    let premium_simple = config.premium.tiers.simple.primary.clone();
    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("premium", "Hello there"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let requests = server.received_requests().await.unwrap();
    let upstream_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream_body["model"], premium_simple);

    let logs = state.get_logs().await;
    assert_eq!(logs[0].savings, Some(0.0));
}

// ---------------------------------------------------------------------------
// Validation and size limits
// ---------------------------------------------------------------------------

/// Oversize bodies are rejected with 413 before any upstream call or
/// payment attempt.
#[tokio::test]
async fn test_oversize_body_rejected_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.dispatch.max_request_size_kb = 200;
    config.dispatch.auto_compress_requests = false;
    let state = make_state(config);
    let addr = spawn_app(state).await;

    let body = chat_request("auto", &"x".repeat(300 * 1024));
    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 413);
    let error: Value = resp.json().await.unwrap();
    assert_eq!(error["error"]["type"], "request_too_large");
}

/// A body of exactly the configured limit is accepted; one byte past the
/// limit is covered by the oversize test above.
#[tokio::test]
async fn test_body_at_exact_limit_accepted() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let mut config = test_config(&server.uri());
    config.dispatch.max_request_size_kb = 200;
    config.dispatch.auto_compress_requests = false;
    let state = make_state(config);
    let addr = spawn_app(state).await;

    // Pad the content so the serialized body is exactly 200 KiB.
    let overhead = serde_json::to_vec(&chat_request("auto", "")).unwrap().len();
    let body = chat_request("auto", &"x".repeat(200 * 1024 - overhead));
    assert_eq!(serde_json::to_vec(&body).unwrap().len(), 200 * 1024);

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let error: Value = resp.json().await.unwrap();
    assert_eq!(error["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_empty_messages_rejected() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&json!({"model": "auto", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_negative_max_tokens_rejected() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&json!({
            "model": "auto",
            "messages": [{"role": "user", "content": "x"}],
            "max_tokens": -1
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let error: Value = resp.json().await.unwrap();
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("max_tokens"));
}

#[tokio::test]
async fn test_unknown_model_rejected() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("nobody/does-not-exist", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let error: Value = resp.json().await.unwrap();
    assert!(error["error"]["message"].as_str().unwrap().contains("model"));
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

/// The same body sent twice within the TTL reaches upstream exactly once;
/// the second response is served from the cache.
#[tokio::test]
async fn test_duplicate_request_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state.clone()).await;
    let client = reqwest::Client::new();
    let body = chat_request("auto", "cache me twice");

    let first = client
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body = first.text().await.unwrap();

    // Give the streaming capture a moment to finalize the cache entry.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = client
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second_body = second.text().await.unwrap();
    assert_eq!(first_body, second_body);

    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    let logs = state.get_logs().await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].cache_status.as_deref(), Some("miss"));
    assert_eq!(logs[1].cache_status.as_deref(), Some("hit"));
}

/// Concurrent identical requests coalesce onto one upstream dispatch and
/// all observe the same bytes.
#[tokio::test]
async fn test_concurrent_duplicates_coalesce() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_success_body())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();
    let body = chat_request("auto", "coalesce me");
    let url = format!("http://{}/v1/chat/completions", addr);

    let (a, b) = tokio::join!(
        client.post(&url).json(&body).send(),
        client.post(&url).json(&body).send(),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.status(), 200);
    assert_eq!(b.status(), 200);
    assert_eq!(a.text().await.unwrap(), b.text().await.unwrap());

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// Bodies differing only in a leading content timestamp marker coalesce.
#[tokio::test]
async fn test_timestamp_stripped_requests_coalesce() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/chat/completions", addr);

    let first = chat_request("auto", "[Mon 2026-08-02 14:05 UTC] same question");
    let second = chat_request("auto", "[Tue 2026-08-03 09:12 UTC] same question");

    assert_eq!(client.post(&url).json(&first).send().await.unwrap().status(), 200);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.post(&url).json(&second).send().await.unwrap().status(), 200);

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

/// When the reasoning primary fails with a 5xx, the next chain entry is
/// tried and its response returned.
#[tokio::test]
async fn test_fallback_on_primary_failure() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri());
    let primary = config.auto.tiers.reasoning.primary.clone();
    let fallback = config.auto.tiers.reasoning.fallback[0].clone();

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"model": primary})))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "upstream exploded", "type": "provider_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut success = openai_success_body();
    success["model"] = json!(fallback.clone());
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"model": fallback})))
        .respond_with(ResponseTemplate::new(200).set_body_json(success))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request(
            "auto",
            "Prove step by step that sqrt(2) is irrational",
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["model"], fallback);

    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    let logs = state.get_logs().await;
    assert_eq!(logs[0].models_tried, vec![primary, fallback]);
}

/// A billing-classified error body triggers fallback even on a 4xx status.
#[tokio::test]
async fn test_insufficient_funds_triggers_fallback() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri());
    let primary = config.auto.tiers.simple.primary.clone();

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"model": primary})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "top up your wallet", "type": "insufficient_funds"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&server)
        .await;

    let state = make_state(config);
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

/// A non-retryable upstream rejection passes straight through.
#[tokio::test]
async fn test_nonretryable_upstream_error_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "bad api key", "type": "authentication_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");
    // No fallback attempts after a fatal error.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// When the whole chain and the emergency model fail, the last upstream
/// error surfaces with its status.
#[tokio::test]
async fn test_exhaustion_returns_last_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "everything is down", "type": "provider_error"}
        })))
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let emergency = config.emergency_model.clone();
    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "provider_error");

    // 3 chain attempts + 1 emergency attempt.
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
    let logs = state.get_logs().await;
    assert!(logs[0].models_tried.contains(&emergency));
    assert_eq!(logs[0].models_tried.len(), 4);
}

/// Per-attempt deadline: a hanging primary times out and the fallback
/// serves the request.
#[tokio::test]
async fn test_upstream_timeout_falls_back() {
    let server = MockServer::start().await;
    let mut config = test_config(&server.uri());
    config.dispatch.upstream_timeout_seconds = 1;
    let primary = config.auto.tiers.simple.primary.clone();

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"model": primary})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_success_body())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&server)
        .await;

    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let logs = state.get_logs().await;
    assert_eq!(logs[0].models_tried.len(), 2);
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// A large request is compressed before dispatch; the assistant tool-call /
/// tool-result pairing survives intact.
#[tokio::test]
async fn test_compression_preserves_tool_pairing() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let mut config = test_config(&server.uri());
    config.dispatch.compression_threshold_kb = 1;
    let state = make_state(config);
    let addr = spawn_app(state.clone()).await;

    let padding = "lorem ipsum dolor sit amet    \n\n\n\n".repeat(2000); // ~60 KiB
    let body = json!({
        "model": "auto",
        "messages": [
            {"role": "user", "content": padding},
            {"role": "assistant", "tool_calls": [{
                "id": "call_123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"city\": \"Paris\"}"}
            }]},
            {"role": "tool", "tool_call_id": "call_123", "content": "{\"temp\": 20}"},
        ],
        "max_tokens": 50
    });

    let resp = reqwest::Client::new()
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let upstream_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = upstream_body["messages"].as_array().unwrap();

    let call_idx = messages
        .iter()
        .position(|m| m["tool_calls"][0]["id"] == "call_123")
        .expect("assistant tool call forwarded");
    let tool_idx = messages
        .iter()
        .position(|m| m["tool_call_id"] == "call_123")
        .expect("tool result forwarded");
    assert!(call_idx < tool_idx);
    assert_eq!(
        messages[call_idx]["tool_calls"][0]["function"]["name"],
        "get_weather"
    );
    assert!(messages[call_idx]["tool_calls"][0]["function"]["arguments"]
        .as_str()
        .unwrap()
        .contains("Paris"));

    // The user padding actually shrank.
    let sent = serde_json::to_vec(&body).unwrap().len();
    assert!(requests[0].body.len() < sent);

    let logs = state.get_logs().await;
    assert!(logs[0].compression_saved_chars.unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// SSE bodies pass through verbatim and still populate the dedup cache.
#[tokio::test]
async fn test_sse_passthrough_and_cache() {
    let server = MockServer::start().await;
    let sse_body = "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\n\
                    data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                    data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/chat/completions", addr);
    let body = json!({
        "model": "auto",
        "messages": [{"role": "user", "content": "stream it"}],
        "stream": true,
        "max_tokens": 50
    });

    let first = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(first.text().await.unwrap(), sse_body);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Retry within TTL replays the captured stream without a second dispatch.
    let second = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text().await.unwrap(), sse_body);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Auxiliary endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_reports_wallet() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let wallet = state.signer.address().to_string();
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["wallet"], wallet);
}

#[tokio::test]
async fn test_models_catalog() {
    let state = make_state(test_config("http://127.0.0.1:1"));
    let addr = spawn_app(state).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{}/models", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "list");

    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"auto"));
    assert!(ids.contains(&"premium"));
    assert!(ids.contains(&"anthropic/claude-opus-4.6"));
}

#[tokio::test]
async fn test_logs_and_stats_populated() {
    let server = MockServer::start().await;
    mock_success(&server).await;

    let state = make_state(test_config(&server.uri()));
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/v1/chat/completions", addr))
        .json(&chat_request("auto", "Hi"))
        .send()
        .await
        .unwrap();

    let logs: Value = client
        .get(format!("http://{}/api/logs", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["logs"][0]["requested_model"], "auto");
    assert_eq!(logs["logs"][0]["status"], "success");

    let stats: Value = client
        .get(format!("http://{}/api/stats", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["requests"], 1);
    assert_eq!(stats["successful"], 1);
    assert_eq!(stats["failed"], 0);
}
