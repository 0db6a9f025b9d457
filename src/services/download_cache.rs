//! Fail-open cache of exported evaluation reports, keyed by a deterministic fingerprint.

use std::sync::Arc;
use std::time::Duration;

use crate::core::coordination::CacheStore;
use crate::schemas::DownloadLink;

const KEY_PREFIX: &str = "download_evaluate:";
const BATCH_SEPARATOR: &str = "_";

#[derive(Clone)]
pub(crate) struct DownloadCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

/// Key for a single evaluation's report.
pub(crate) fn fingerprint_single(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Key for a multi-submission report. Depends only on the set of ids: order and repeats
/// in the request do not matter.
pub(crate) fn fingerprint_batch<S: AsRef<str>>(ids: &[S]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    format!("{KEY_PREFIX}{}", sorted.join(BATCH_SEPARATOR))
}

impl DownloadCache {
    pub(crate) fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Any store or decoding failure is reported as a miss.
    pub(crate) async fn get(&self, key: &str) -> Option<DownloadLink> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("download_cache_total", "result" => "miss").increment(1);
                return None;
            }
            Err(err) => {
                metrics::counter!("download_cache_total", "result" => "error").increment(1);
                tracing::warn!(key, error = %err, "Download cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<DownloadLink>(&raw) {
            Ok(link) => {
                metrics::counter!("download_cache_total", "result" => "hit").increment(1);
                tracing::info!(key, "Download cache hit");
                Some(link)
            }
            Err(err) => {
                metrics::counter!("download_cache_total", "result" => "error").increment(1);
                tracing::warn!(key, error = %err, "Corrupt download cache entry; treating as miss");
                None
            }
        }
    }

    /// Fixed-window write; failures are logged and swallowed.
    pub(crate) async fn set(&self, key: &str, link: &DownloadLink) {
        let raw = match serde_json::to_string(link) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(key, error = %err, "Failed to encode download link for cache");
                return;
            }
        };

        match self.store.set_with_ttl(key, &raw, self.ttl).await {
            Ok(()) => {
                tracing::info!(key, ttl_seconds = self.ttl.as_secs(), "Cached download link");
            }
            Err(err) => {
                tracing::error!(key, error = %err, "Failed to cache download link");
            }
        }
    }

    pub(crate) async fn invalidate(&self, key: &str) {
        if let Err(err) = self.store.delete(key).await {
            tracing::warn!(key, error = %err, "Failed to invalidate download cache entry");
        }
    }
}
