//! Contracts the lease lock and the download cache need from the shared key-value store.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CoordinationError {
    #[error("coordination store is not connected")]
    Unavailable,
    #[error("coordination store command failed: {0}")]
    Command(#[from] redis::RedisError),
}

/// Atomic primitives backing the lease lock. Every mutation is conditional on the stored
/// value so a holder can only ever touch a lease it still owns.
#[async_trait]
pub(crate) trait CoordinationStore: Send + Sync {
    /// Stores `key -> value` with `ttl` only when `key` is absent.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    /// Resets the expiry of `key` to `ttl` only while it still holds `expected`.
    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    /// Deletes `key` only while it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str)
        -> Result<bool, CoordinationError>;
}

/// Plain expiring string storage used by the download cache.
#[async_trait]
pub(crate) trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CoordinationError>;

    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;
}
