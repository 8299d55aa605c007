use anyhow::Context;
use blockrun_router::config::Config;
use blockrun_router::state::AppState;
use blockrun_router::wallet::{LocalWalletSigner, PaymentSigner, WalletStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8402;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockrun_router=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let key = WalletStore::load().context("loading wallet key")?;
    let signer = LocalWalletSigner::from_key(&key).context("creating wallet signer")?;
    tracing::info!(wallet = %signer.address(), "wallet loaded");

    let config = Config::default();
    let problems = config.validate();
    if problems > 0 {
        tracing::warn!(problems, "configuration has invariant violations; continuing");
    }

    let state = AppState::new(config, Arc::new(signer));
    let app = blockrun_router::app(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let port = std::env::var("BLOCKRUN_PROXY_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
