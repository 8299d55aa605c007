//! Request deduplication cache.
//!
//! Retried client requests (agents love retry loops) are coalesced so a
//! logical request is paid for and dispatched upstream at most once within
//! the TTL window. Completed responses are replayed; concurrent duplicates
//! wait on the original dispatch.

use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Responses above this size are streamed to the client but never cached.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Leading timestamp markers injected by some clients, e.g.
/// `[Mon 2026-08-02 14:05 UTC] `. Stripped before hashing so a retried
/// request with a fresh timestamp still coalesces.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\w{3}\s+\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}\s+\w+\]\s*").unwrap()
});

/// A completed upstream response held for replay.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub completed_at: Instant,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            completed_at: Instant::now(),
        }
    }

    /// Synthetic response delivered to waiters when the origin request
    /// fails. Never cached.
    pub fn origin_failure() -> Self {
        Self::new(
            503,
            vec![("content-type".to_string(), "application/json".to_string())],
            Bytes::from_static(
                br#"{"error":{"message":"Original request failed, please retry","type":"dedup_origin_failed"}}"#,
            ),
        )
    }
}

/// Result of a combined cache probe.
pub enum Lookup {
    /// A completed response within TTL.
    Hit(CachedResponse),
    /// Another request with the same key is in flight; await the receiver.
    Pending(oneshot::Receiver<CachedResponse>),
    /// No entry existed. The key is now marked in flight and the caller
    /// must eventually call `complete` or `remove_inflight`.
    Miss,
}

struct Inner {
    completed: HashMap<String, CachedResponse>,
    inflight: HashMap<String, Vec<oneshot::Sender<CachedResponse>>>,
}

pub struct DedupCache {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                completed: HashMap::new(),
                inflight: HashMap::new(),
            }),
        }
    }

    /// Canonicalize a request body: parse as JSON, strip leading timestamp
    /// markers from every `content` string, sort object keys recursively,
    /// re-serialize. Non-JSON bodies canonicalize to themselves.
    pub fn canonicalize(body: &[u8]) -> Vec<u8> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => {
                let canonical = canonical_value(value, false);
                serde_json::to_vec(&canonical).unwrap_or_else(|_| body.to_vec())
            }
            Err(_) => body.to_vec(),
        }
    }

    /// Dedup key: first 16 hex chars of SHA-256 over the canonical body.
    pub fn key(body: &[u8]) -> String {
        let canonical = Self::canonicalize(body);
        let digest = Sha256::digest(&canonical);
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }

    /// Atomic probe: replay hit, join an in-flight entry, or mark the key
    /// in flight and report a miss. One lock acquisition, so two racing
    /// requests can never both see a miss.
    pub fn lookup(&self, key: &str) -> Lookup {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");

        if let Some(entry) = inner.completed.get(key) {
            if entry.completed_at.elapsed() <= self.ttl {
                return Lookup::Hit(entry.clone());
            }
            inner.completed.remove(key);
        }

        if let Some(waiters) = inner.inflight.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            return Lookup::Pending(rx);
        }

        inner.inflight.insert(key.to_string(), Vec::new());
        Lookup::Miss
    }

    /// Completed response within TTL, if any. Expired entries are evicted
    /// lazily here.
    pub fn get_cached(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        match inner.completed.get(key) {
            Some(entry) if entry.completed_at.elapsed() <= self.ttl => Some(entry.clone()),
            Some(_) => {
                inner.completed.remove(key);
                None
            }
            None => None,
        }
    }

    /// Register a waiter against an existing in-flight entry.
    pub fn get_inflight(&self, key: &str) -> Option<oneshot::Receiver<CachedResponse>> {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        inner.inflight.get_mut(key).map(|waiters| {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            rx
        })
    }

    /// Create an empty in-flight entry. Returns false if one already
    /// existed (the caller lost a race and should join it instead).
    pub fn mark_inflight(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        if inner.inflight.contains_key(key) {
            return false;
        }
        inner.inflight.insert(key.to_string(), Vec::new());
        true
    }

    /// Resolve an in-flight entry with a successful response: wake every
    /// waiter, cache the body if it fits, prune expired entries.
    pub fn complete(&self, key: &str, response: CachedResponse) {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");

        if let Some(waiters) = inner.inflight.remove(key) {
            for tx in waiters {
                let _ = tx.send(response.clone());
            }
        }

        if response.body.len() <= MAX_BODY_SIZE {
            inner.completed.insert(key.to_string(), response);
        }

        let ttl = self.ttl;
        inner
            .completed
            .retain(|_, entry| entry.completed_at.elapsed() <= ttl);
    }

    /// Resolve an in-flight entry as failed: waiters get a synthetic 503
    /// and the failure is not cached, so each waiter may retry.
    pub fn remove_inflight(&self, key: &str) {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        if let Some(waiters) = inner.inflight.remove(key) {
            for tx in waiters {
                let _ = tx.send(CachedResponse::origin_failure());
            }
        }
    }

    /// Drop expired completed entries.
    pub fn prune(&self) {
        let mut inner = self.inner.lock().expect("dedup lock poisoned");
        let ttl = self.ttl;
        inner
            .completed
            .retain(|_, entry| entry.completed_at.elapsed() <= ttl);
    }

    #[cfg(test)]
    fn inflight_count(&self) -> usize {
        self.inner.lock().unwrap().inflight.len()
    }
}

/// Rebuild a JSON value with sorted object keys, stripping timestamp
/// markers from `content` strings.
fn canonical_value(value: Value, is_content: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                let content_field = k == "content";
                sorted.insert(k, canonical_value(v, content_field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| canonical_value(v, false))
                .collect(),
        ),
        Value::String(s) if is_content => {
            Value::String(TIMESTAMP_RE.replace(&s, "").into_owned())
        }
        other => other,
    }
}
