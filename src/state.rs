use crate::config::Config;
use crate::dedup::DedupCache;
use crate::wallet::PaymentSigner;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One entry per handled request, kept in a bounded ring for /api/logs.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Model (or profile keyword) the client asked for.
    pub requested_model: String,
    /// Model the request was actually served by.
    pub served_model: Option<String>,
    pub tier: Option<String>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub status: String, // "success", "error", "rejected"
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub models_tried: Vec<String>,
    pub cache_status: Option<String>, // "hit", "coalesced", "miss"
    pub cost_estimate: Option<f64>,
    pub savings: Option<f64>,
    pub compression_saved_chars: Option<usize>,
    pub error_message: Option<String>,
}

impl RequestLog {
    pub fn new(requested_model: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            requested_model: requested_model.to_string(),
            served_model: None,
            tier: None,
            score: None,
            confidence: None,
            status: "pending".to_string(),
            status_code: None,
            duration_ms: 0,
            models_tried: Vec::new(),
            cache_status: None,
            cost_estimate: None,
            savings: None,
            compression_saved_chars: None,
            error_message: None,
        }
    }
}

const MAX_LOGS: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub dedup: Arc<DedupCache>,
    pub signer: Arc<dyn PaymentSigner>,
    pub http: reqwest::Client,
    pub logs: Arc<RwLock<Vec<RequestLog>>>,
}

impl AppState {
    pub fn new(config: Config, signer: Arc<dyn PaymentSigner>) -> Self {
        let dedup = Arc::new(DedupCache::new(Duration::from_secs(
            config.dedup.ttl_seconds,
        )));
        Self {
            config: Arc::new(RwLock::new(config)),
            dedup,
            signer,
            http: reqwest::Client::new(),
            logs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn add_log(&self, log: RequestLog) {
        let mut logs = self.logs.write().await;
        logs.push(log);
        if logs.len() > MAX_LOGS {
            let drain_count = logs.len() - MAX_LOGS;
            logs.drain(0..drain_count);
        }
    }

    pub async fn get_logs(&self) -> Vec<RequestLog> {
        self.logs.read().await.clone()
    }

    /// Aggregate counters for /api/stats.
    pub async fn stats(&self) -> serde_json::Value {
        let logs = self.logs.read().await;
        let requests = logs.len();
        let successful = logs.iter().filter(|l| l.status == "success").count();
        let failed = logs.iter().filter(|l| l.status == "error").count();
        let cache_hits = logs
            .iter()
            .filter(|l| matches!(l.cache_status.as_deref(), Some("hit") | Some("coalesced")))
            .count();
        let total_cost: f64 = logs.iter().filter_map(|l| l.cost_estimate).sum();
        let mean_savings = {
            let savings: Vec<f64> = logs.iter().filter_map(|l| l.savings).collect();
            if savings.is_empty() {
                0.0
            } else {
                savings.iter().sum::<f64>() / savings.len() as f64
            }
        };

        serde_json::json!({
            "requests": requests,
            "successful": successful,
            "failed": failed,
            "cache_hits": cache_hits,
            "total_cost_estimate": total_cost,
            "mean_savings": mean_savings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::WalletError;
    use async_trait::async_trait;

    struct NullSigner;

    #[async_trait]
    impl PaymentSigner for NullSigner {
        async fn sign(&self, _amount_usd: f64) -> Result<String, WalletError> {
            Ok("sig".to_string())
        }
        fn address(&self) -> &str {
            "0x0000000000000000000000000000000000000000"
        }
    }

    fn state() -> AppState {
        AppState::new(Config::default(), Arc::new(NullSigner))
    }

    #[tokio::test]
    async fn test_log_ring_bounded() {
        let state = state();
        for _ in 0..(MAX_LOGS + 50) {
            state.add_log(RequestLog::new("auto")).await;
        }
        assert_eq!(state.get_logs().await.len(), MAX_LOGS);
    }

    #[tokio::test]
    async fn test_stats_aggregation() {
        let state = state();

        let mut ok = RequestLog::new("auto");
        ok.status = "success".to_string();
        ok.cost_estimate = Some(0.5);
        ok.savings = Some(0.8);
        state.add_log(ok).await;

        let mut err = RequestLog::new("auto");
        err.status = "error".to_string();
        state.add_log(err).await;

        let mut hit = RequestLog::new("auto");
        hit.status = "success".to_string();
        hit.cache_status = Some("hit".to_string());
        state.add_log(hit).await;

        let stats = state.stats().await;
        assert_eq!(stats["requests"], 3);
        assert_eq!(stats["successful"], 2);
        assert_eq!(stats["failed"], 1);
        assert_eq!(stats["cache_hits"], 1);
    }

    #[tokio::test]
    async fn test_log_ids_unique() {
        let a = RequestLog::new("auto");
        let b = RequestLog::new("auto");
        assert_ne!(a.id, b.id);
    }
}
