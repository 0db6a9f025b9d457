use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

use crate::core::coordination::{CacheStore, CoordinationError, CoordinationStore};

const COMPARE_AND_EXTEND: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("PEXPIRE", KEYS[1], ARGV[2])
    end
    return 0
"#;

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    end
    return 0
"#;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, CoordinationError> {
        let manager = { self.manager.read().await.clone() };
        manager.ok_or(CoordinationError::Unavailable)
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    ttl.as_millis().clamp(1, i64::MAX as u128) as i64
}

#[async_trait]
impl CoordinationStore for RedisHandle {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut manager = self.connection().await?;
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut manager)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut manager = self.connection().await?;
        let script = redis::Script::new(COMPARE_AND_EXTEND);
        let extended: i64 = script
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut manager)
            .await?;

        Ok(extended == 1)
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, CoordinationError> {
        let mut manager = self.connection().await?;
        let script = redis::Script::new(COMPARE_AND_DELETE);
        let deleted: i64 = script.key(key).arg(expected).invoke_async(&mut manager).await?;

        Ok(deleted == 1)
    }
}

#[async_trait]
impl CacheStore for RedisHandle {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let mut manager = self.connection().await?;
        let value: Option<String> = cmd("GET").arg(key).query_async(&mut manager).await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CoordinationError> {
        let mut manager = self.connection().await?;
        cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut manager)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        let mut manager = self.connection().await?;
        cmd("DEL").arg(key).query_async::<_, i64>(&mut manager).await?;
        Ok(())
    }
}
