use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tinyflags_core::{PubSub, Subscription};

const DEFAULT_MEMORY_STORE_TTL: Duration = Duration::from_secs(60);

/// Configuration for wiring a [`tinyflags_core::MemoryStore`] to a live
/// Redis invalidation channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryStoreConfig {
    pub redis_url: String,
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_MEMORY_STORE_TTL
}

impl MemoryStoreConfig {
    pub fn new(redis_url: impl Into<String>) -> Self {
        MemoryStoreConfig {
            redis_url: redis_url.into(),
            ttl: DEFAULT_MEMORY_STORE_TTL,
        }
    }

    pub fn into_core(&self) -> tinyflags_core::MemoryStoreConfig {
        tinyflags_core::MemoryStoreConfig { ttl: self.ttl }
    }
}

/// Redis-backed [`PubSub`] transport. `publish` and `ping` go through a
/// reconnecting [`ConnectionManager`] (matching the rest of this crate's
/// command path); `subscribe` opens a dedicated connection per
/// `redis::aio::PubSub`'s requirements and hands back an owned message
/// stream via `into_on_message`, since a subscription long outlives the
/// call that created it.
pub struct RedisPubSub {
    client: redis::Client,
    commands: ConnectionManager,
}

impl RedisPubSub {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let commands = ConnectionManager::new(client.clone()).await?;
        Ok(RedisPubSub { client, commands })
    }
}

struct RedisSubscription {
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn recv(&mut self) -> Option<String> {
        let msg = self.stream.next().await?;
        msg.get_payload::<String>().ok()
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()> {
        let mut conn = self.commands.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Box<dyn Subscription>> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(channel).await?;
        let stream = pubsub.into_on_message();
        Ok(Box::new(RedisSubscription {
            stream: Box::pin(stream),
        }))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.commands.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises publish/subscribe against a live Redis, gated the same way
    /// `tinyflags-postgres`'s round-trip test gates on a database URL.
    #[tokio::test]
    async fn publish_is_observed_by_subscriber() {
        let Ok(redis_url) = std::env::var("TINYFLAGS_TEST_REDIS_URL") else {
            eprintln!("skipping: TINYFLAGS_TEST_REDIS_URL not set");
            return;
        };

        let pubsub = RedisPubSub::connect(&redis_url)
            .await
            .expect("connect to test redis");
        let mut subscription = pubsub
            .subscribe("tinyflags::pubsub::test")
            .await
            .expect("subscribe");

        // Give the subscription a moment to register with the server before
        // publishing, since `subscribe` only confirms the client-side ack.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pubsub
            .publish("tinyflags::pubsub::test", "hello")
            .await
            .expect("publish");

        let received = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
            .await
            .expect("received a message before the timeout");
        assert_eq!(received.as_deref(), Some("hello"));
    }
}
