pub mod classifier;
pub mod compression;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod scorer;
pub mod selector;
pub mod state;
pub mod wallet;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};

/// Hard cap on request reads, well above any configurable limit. The
/// per-deployment limit in DispatchConfig is enforced afterwards with a
/// proper JSON error body.
const HARD_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Build the application router with the given state.
pub fn app(state: state::AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/v1/models", get(handlers::list_models))
        .route("/api/logs", get(handlers::get_logs))
        .route("/api/stats", get(handlers::get_stats))
        .layer(DefaultBodyLimit::max(HARD_BODY_LIMIT))
        .with_state(state)
}
