//! Wallet key loading and x402 payment-header signing.
//!
//! The proxy attaches an `X-Payment` header to every upstream request: a
//! base64 JSON envelope carrying the paying address, the authorized amount
//! and an EIP-191 signature over the payload. The upstream settles against
//! it; the proxy never talks to a chain directly.

use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable holding the 0x-prefixed 64-hex-char private key.
pub const WALLET_KEY_ENV: &str = "BLOCKRUN_WALLET_KEY";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no wallet key: set {WALLET_KEY_ENV} or create the key file")]
    Missing,
    #[error("invalid private key format (expected 0x + 64 hex chars)")]
    InvalidKey,
    #[error("failed to create signer: {0}")]
    SignerCreation(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
}

/// Loads the wallet key from the environment or the key file.
pub struct WalletStore;

impl WalletStore {
    /// Key file location: `~/.openclaw/blockrun/wallet.key`, mode 0600,
    /// single `0x<64 hex>` line. Written by the installer, read here.
    pub fn key_file_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".openclaw")
            .join("blockrun")
            .join("wallet.key")
    }

    pub fn load() -> Result<String, WalletError> {
        if let Ok(key) = std::env::var(WALLET_KEY_ENV) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return validate_key(key);
            }
        }

        let path = Self::key_file_path();
        if !path.exists() {
            return Err(WalletError::Missing);
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| WalletError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        validate_key(raw.trim().to_string())
    }
}

fn validate_key(key: String) -> Result<String, WalletError> {
    let hex = key.strip_prefix("0x").ok_or(WalletError::InvalidKey)?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidKey);
    }
    Ok(key)
}

/// Seam the dispatcher depends on. Safe for concurrent use.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Produce the `X-Payment` header value authorizing `amount_usd`.
    async fn sign(&self, amount_usd: f64) -> Result<String, WalletError>;

    /// The paying address, `0x` + 40 hex chars.
    fn address(&self) -> &str;
}

/// In-process signer over a local private key.
pub struct LocalWalletSigner {
    signer: PrivateKeySigner,
    address: String,
}

#[derive(Serialize)]
struct PaymentPayload<'a> {
    from: &'a str,
    amount_usd: f64,
    nonce: String,
    issued_at: String,
}

impl LocalWalletSigner {
    pub fn from_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key = validate_key(private_key_hex.trim().to_string())?;
        let hex = key.strip_prefix("0x").expect("validated above");
        let bytes = hex_decode(hex).map_err(|_| WalletError::InvalidKey)?;
        let signer = PrivateKeySigner::from_bytes(&B256::from_slice(&bytes))
            .map_err(|e| WalletError::SignerCreation(e.to_string()))?;
        let address = format!("{:#x}", signer.address());
        Ok(Self { signer, address })
    }
}

#[async_trait]
impl PaymentSigner for LocalWalletSigner {
    async fn sign(&self, amount_usd: f64) -> Result<String, WalletError> {
        let payload = PaymentPayload {
            from: &self.address,
            amount_usd,
            nonce: uuid::Uuid::new_v4().to_string(),
            issued_at: chrono::Utc::now().to_rfc3339(),
        };
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| WalletError::SigningFailed(e.to_string()))?;

        let signature = self
            .signer
            .sign_message(payload_json.as_bytes())
            .await
            .map_err(|e| WalletError::SigningFailed(e.to_string()))?;

        let envelope = serde_json::json!({
            "payload": payload_json,
            "signature": format!("0x{}", hex_encode(&signature.as_bytes())),
        });
        Ok(BASE64.encode(envelope.to_string()))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// Minimal hex helpers; not worth another crate.

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
