//! Credential store for the cached auth record
//!
//! A string key-value contract with one key in use: `authData`, holding the
//! JSON-encoded `AuthData`. There is no TTL and no versioning; the last
//! writer wins. Backends must report connection problems as
//! `StoreUnavailable` so a dead cache never looks like "not logged in".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Key of the single cached auth record.
pub const AUTH_DATA_KEY: &str = "authData";

/// Key-value persistence backing the cached auth record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store. Used in tests and for single-process development
/// runs where losing the session on restart is acceptable.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(key.to_string(), value.to_string());
        debug!(key, "stored value");
        Ok(())
    }
}

/// Redis-backed store shared by every gateway instance.
///
/// The connection is established lazily on first use and reused afterwards;
/// `ConnectionManager` reconnects on its own after a dropped connection. A
/// failed initial connect is not cached, so the next request tries again.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisStore {
    /// Parse the connection URL. Does not connect.
    pub fn open(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::StoreUnavailable(format!("invalid redis URL: {e}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let mut connection = self.connection.lock().await;
        if let Some(conn) = connection.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(self.timeout, self.client.get_connection_manager())
            .await
            .map_err(|_| Error::StoreUnavailable("redis connect timed out".into()))?
            .map_err(|e| {
                warn!(error = %e, "redis connection failed");
                Error::StoreUnavailable(format!("redis connect failed: {e}"))
            })?;

        info!("redis client connected");
        *connection = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(self.timeout, conn.get::<_, Option<String>>(key))
            .await
            .map_err(|_| Error::StoreUnavailable(format!("redis GET {key} timed out")))?
            .map_err(|e| {
                warn!(key, error = %e, "redis GET failed");
                Error::StoreUnavailable(format!("redis GET {key} failed: {e}"))
            })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(self.timeout, conn.set::<_, _, ()>(key, value))
            .await
            .map_err(|_| Error::StoreUnavailable(format!("redis SET {key} timed out")))?
            .map_err(|e| {
                warn!(key, error = %e, "redis SET failed");
                Error::StoreUnavailable(format!("redis SET {key} failed: {e}"))
            })?;
        debug!(key, "stored value");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_store_get_set() {
        let store = MemoryStore::new();
        assert!(store.get(AUTH_DATA_KEY).await.unwrap().is_none());

        store.set(AUTH_DATA_KEY, r#"{"a":1}"#).await.unwrap();
        assert_eq!(
            store.get(AUTH_DATA_KEY).await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[tokio::test]
    async fn memory_store_last_write_wins() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(AUTH_DATA_KEY, &i.to_string()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let value: u32 = store
            .get(AUTH_DATA_KEY)
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert!(value < 10);
    }

    #[test]
    fn redis_store_rejects_invalid_url() {
        let result = RedisStore::open("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn unreachable_redis_is_store_unavailable() {
        // Nothing listens on port 1
        let store = RedisStore::open("redis://127.0.0.1:1/", Duration::from_secs(2)).unwrap();

        let get = store.get(AUTH_DATA_KEY).await;
        assert!(matches!(get, Err(Error::StoreUnavailable(_))), "got: {get:?}");

        let set = store.set(AUTH_DATA_KEY, "{}").await;
        assert!(matches!(set, Err(Error::StoreUnavailable(_))), "got: {set:?}");
    }

    #[tokio::test]
    async fn silent_redis_times_out_as_store_unavailable() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store =
            RedisStore::open(&format!("redis://{addr}/"), Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let get = store.get(AUTH_DATA_KEY).await;
        assert!(matches!(get, Err(Error::StoreUnavailable(_))), "got: {get:?}");

        let set = store.set(AUTH_DATA_KEY, "{}").await;
        assert!(matches!(set, Err(Error::StoreUnavailable(_))), "got: {set:?}");

        assert!(
            started.elapsed() < Duration::from_secs(5),
            "store calls took {:?}",
            started.elapsed()
        );
    }
}
