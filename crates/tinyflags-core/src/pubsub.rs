use std::sync::Arc;
use tokio::sync::broadcast;

/// Fixed invalidation channel name, shared by every [`crate::MemoryStore`]
/// instance in a cluster.
pub const INVALIDATIONS_CHANNEL: &str = "tinyflags::memoryStore::invalidations";

/// A parsed invalidation message: `"<sender-id>:<hex-hash>:<flag-key>"`.
/// `hash` is empty for deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationMessage {
    pub sender_id: String,
    pub hash: String,
    pub key: String,
}

impl InvalidationMessage {
    pub fn format(sender_id: &str, hash: &str, key: &str) -> String {
        format!("{sender_id}:{hash}:{key}")
    }

    /// Parses with at most a 3-way split; `None` on malformed payloads.
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.splitn(3, ':');
        let sender_id = parts.next()?.to_string();
        let hash = parts.next()?.to_string();
        let key = parts.next()?.to_string();
        Some(InvalidationMessage {
            sender_id,
            hash,
            key,
        })
    }
}

/// A live subscription to the invalidation channel: an async stream of raw
/// payload strings, plus a way to tell whether the underlying transport
/// believes it is still reachable.
#[async_trait::async_trait]
pub trait Subscription: Send {
    /// Waits for the next message, or `None` if the subscription has been
    /// permanently closed.
    async fn recv(&mut self) -> Option<String>;
}

/// The pub/sub transport [`crate::MemoryStore`] consumes: an at-most-once,
/// best-effort message channel. The core depends only on this contract; the
/// concrete transport (Redis in this workspace's `tinyflags-redis` crate) is
/// an external collaborator.
#[async_trait::async_trait]
pub trait PubSub: Send + Sync {
    /// Publishes `payload` on `channel`. Best-effort: failures are surfaced
    /// to the caller but are not retried by the transport itself.
    async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()>;

    /// Subscribes to `channel`, blocking until the subscription is confirmed
    /// by the transport.
    async fn subscribe(&self, channel: &str) -> anyhow::Result<Box<dyn Subscription>>;

    /// Probes transport liveness, used by the recovery backoff loop to choose
    /// between the short and long retry delay.
    async fn ping(&self) -> anyhow::Result<()>;
}

struct LocalSubscription(broadcast::Receiver<String>);

#[async_trait::async_trait]
impl Subscription for LocalSubscription {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.0.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// An in-process fan-out `PubSub`, built on a broadcast channel. Lets tests
/// exercise cross-process coherence between two `MemoryStore`s without a
/// live Redis.
#[derive(Clone)]
pub struct LocalPubSub {
    tx: Arc<broadcast::Sender<(String, String)>>,
}

impl LocalPubSub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        LocalPubSub { tx: Arc::new(tx) }
    }
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PubSub for LocalPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> anyhow::Result<()> {
        // No subscribers is not an error: at-most-once, best-effort delivery.
        let _ = self.tx.send((channel.to_string(), payload.to_string()));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<Box<dyn Subscription>> {
        let channel = channel.to_string();
        let mut rx = self.tx.subscribe();
        let (filtered_tx, filtered_rx) = broadcast::channel(1024);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok((c, payload)) if c == channel => {
                        if filtered_tx.send(payload).is_err() {
                            return;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(Box::new(LocalSubscription(filtered_rx)))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_part_payload() {
        let msg = InvalidationMessage::parse("abc123:deadbeef:rate_limit").unwrap();
        assert_eq!(msg.sender_id, "abc123");
        assert_eq!(msg.hash, "deadbeef");
        assert_eq!(msg.key, "rate_limit");
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(InvalidationMessage::parse("not-enough-parts").is_none());
    }

    #[test]
    fn formats_and_reparses() {
        let formatted = InvalidationMessage::format("id", "", "k");
        let parsed = InvalidationMessage::parse(&formatted).unwrap();
        assert_eq!(parsed.hash, "");
        assert_eq!(parsed.key, "k");
    }
}
