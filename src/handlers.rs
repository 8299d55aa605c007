use crate::dispatch;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch::handle_chat(state, headers, body).await
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "wallet": state.signer.address(),
    }))
}

/// Static catalog: every priced model plus the virtual routing profiles.
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.get_config().await;
    let mut models: Vec<ModelEntry> = Vec::new();

    for profile in ["auto", "free", "eco", "premium"] {
        models.push(ModelEntry {
            id: profile.to_string(),
            object: "model".to_string(),
            created: 1700000000,
            owned_by: "blockrun-router".to_string(),
        });
    }

    let mut ids: Vec<&String> = config.pricing.keys().collect();
    ids.sort();
    for id in ids {
        let owned_by = id.split('/').next().unwrap_or("unknown").to_string();
        models.push(ModelEntry {
            id: id.clone(),
            object: "model".to_string(),
            created: 1700000000,
            owned_by,
        });
    }

    Json(ModelListResponse {
        object: "list".to_string(),
        data: models,
    })
}

pub async fn get_logs(State(state): State<AppState>) -> impl IntoResponse {
    let logs = state.get_logs().await;
    Json(json!({
        "total": logs.len(),
        "logs": logs,
    }))
}

pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats().await)
}
