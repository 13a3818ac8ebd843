use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tinyflags_core::{run_cancellable, Store, StoreError};
use tokio_util::sync::CancellationToken;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for the Remote Cache Store tier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteCacheConfig {
    pub redis_url: String,
    pub namespace: String,
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

impl RemoteCacheConfig {
    pub fn new(redis_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        RemoteCacheConfig {
            redis_url: redis_url.into(),
            namespace: namespace.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub async fn connect(&self) -> anyhow::Result<RemoteCacheStore> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let connection = ConnectionManager::new(client).await?;
        Ok(RemoteCacheStore {
            connection,
            namespace: self.namespace.clone(),
            ttl: self.ttl,
        })
    }
}

/// Namespaced Redis-backed [`Store`] using the `"<namespace>::<flag-key>"`
/// wire layout, built on a reconnecting `ConnectionManager`.
pub struct RemoteCacheStore {
    connection: ConnectionManager,
    namespace: String,
    ttl: Duration,
}

impl RemoteCacheStore {
    fn wire_key(&self, key: &str) -> String {
        format!("{}::{}", self.namespace, key)
    }
}

#[async_trait]
impl Store for RemoteCacheStore {
    async fn read(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        run_cancellable(cancel, async {
            let mut conn = self.connection.clone();
            let value: Option<Vec<u8>> = conn
                .get(self.wire_key(key))
                .await
                .map_err(|err| StoreError::transport(anyhow::Error::new(err)))?;
            Ok(value)
        })
        .await
    }

    async fn write(
        &self,
        key: &str,
        value: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        run_cancellable(cancel, async {
            let mut conn = self.connection.clone();
            let wire_key = self.wire_key(key);
            match value {
                None => {
                    let _: () = conn
                        .del(wire_key)
                        .await
                        .map_err(|err| StoreError::transport(anyhow::Error::new(err)))?;
                }
                Some(bytes) => {
                    let _: () = conn
                        .set_ex(wire_key, bytes, self.ttl.as_secs().max(1) as usize)
                        .await
                        .map_err(|err| StoreError::transport(anyhow::Error::new(err)))?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        // `ConnectionManager` reconnects transparently and has no explicit
        // shutdown; tinyflags just stops issuing commands through it.
        Ok(())
    }
}
