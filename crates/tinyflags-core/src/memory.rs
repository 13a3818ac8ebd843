use crate::error::StoreError;
use crate::logger::Logger;
use crate::pubsub::{InvalidationMessage, PubSub, INVALIDATIONS_CHANNEL};
use crate::store::Store;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct MemoryStoreConfig {
    pub ttl: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        MemoryStoreConfig { ttl: DEFAULT_TTL }
    }
}

struct Entry {
    payload: Vec<u8>,
    hash: String,
    expires_at: Instant,
}

struct Inner {
    values: HashMap<String, Entry>,
    active: bool,
    closed: bool,
}

/// Per-process TTL cache whose coherence across processes is maintained by
/// [`PubSub`] invalidation messages. The only state in which it serves
/// values is `active`: a background subscriber must have confirmed its
/// subscription to [`INVALIDATIONS_CHANNEL`] first, so the process never
/// answers from a map it could be holding stale.
///
/// `identity` (128-bit, hex-encoded) plus a content digest identify each
/// write's invalidation: identity is the primary self-echo filter, the
/// digest is the belt-and-braces check for an echo that outlives a newer
/// local write.
pub struct MemoryStore {
    identity: String,
    ttl: Duration,
    inner: RwLock<Inner>,
    pubsub: Arc<dyn PubSub>,
    logger: Arc<dyn Logger>,
    cancel: CancellationToken,
    close_started: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Spawns the subscriber and sweeper background tasks and returns the
    /// shared handle. The store is inactive (Read/Write are no-ops) until
    /// the subscriber's first subscribe-confirmation arrives.
    pub fn new(pubsub: Arc<dyn PubSub>, config: MemoryStoreConfig, logger: Arc<dyn Logger>) -> Arc<Self> {
        let mut id_bytes = [0u8; 16];
        rand::thread_rng().fill(&mut id_bytes);
        let identity = hex::encode(id_bytes);

        let store = Arc::new(MemoryStore {
            identity,
            ttl: config.ttl,
            inner: RwLock::new(Inner {
                values: HashMap::new(),
                active: false,
                closed: false,
            }),
            pubsub,
            logger,
            cancel: CancellationToken::new(),
            close_started: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        let subscriber = tokio::spawn(Self::run_subscriber(store.clone()));
        let sweeper = tokio::spawn(Self::run_sweeper(store.clone()));
        store.tasks.lock().unwrap().push(subscriber);
        store.tasks.lock().unwrap().push(sweeper);
        store
    }

    /// Whether the subscriber has confirmed and the store is currently
    /// serving values.
    pub async fn is_active(&self) -> bool {
        self.inner.read().await.active
    }

    async fn run_subscriber(store: Arc<Self>) {
        loop {
            if store.cancel.is_cancelled() {
                return;
            }
            match store.subscribe_once().await {
                Ok(()) => return,
                Err(err) => {
                    {
                        let mut guard = store.inner.write().await;
                        guard.active = false;
                        guard.values.clear();
                    }
                    if store.cancel.is_cancelled() {
                        return;
                    }
                    let delay = if store.pubsub.ping().await.is_ok() {
                        store.logger.error(&format!(
                            "listening for invalidations returned an error, retrying in ~1s: {err}"
                        ));
                        jittered(1000, 500)
                    } else {
                        store.logger.error(&format!(
                            "pub/sub transport ping failed, retrying in ~10s: {err}"
                        ));
                        jittered(10_000, 2_000)
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = store.cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn subscribe_once(&self) -> anyhow::Result<()> {
        self.logger.debug("subscribing to key invalidations");
        let mut subscription = self.pubsub.subscribe(INVALIDATIONS_CHANNEL).await?;
        {
            let mut guard = self.inner.write().await;
            guard.active = true;
        }
        self.logger.debug("memory store is now active");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                msg = subscription.recv() => match msg {
                    None => anyhow::bail!("invalidation subscription closed"),
                    Some(payload) => self.handle_invalidation(&payload).await,
                },
            }
        }
    }

    async fn handle_invalidation(&self, payload: &str) {
        let Some(msg) = InvalidationMessage::parse(payload) else {
            self.logger.debug(&format!("dropping malformed invalidation '{payload}'"));
            return;
        };
        if msg.sender_id == self.identity {
            self.logger.debug(&format!("skipping self-echo for '{}'", msg.key));
            return;
        }
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.values.get(&msg.key) {
            if entry.hash != msg.hash {
                self.logger.debug(&format!("invalidating '{}'", msg.key));
                guard.values.remove(&msg.key);
            }
        }
    }

    async fn run_sweeper(store: Arc<Self>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = store.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let mut guard = store.inner.write().await;
                    if guard.closed {
                        continue;
                    }
                    guard.values.retain(|_, entry| entry.expires_at > now);
                }
            }
        }
    }

    async fn publish_invalidation(&self, hash: &str, key: &str) {
        let payload = InvalidationMessage::format(&self.identity, hash, key);
        if let Err(err) = self.pubsub.publish(INVALIDATIONS_CHANNEL, &payload).await {
            self.logger.error(&format!("failed to invalidate '{key}': {err}"));
        }
    }

    fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

fn jittered(delay_ms: u64, jitter_ms: u64) -> Duration {
    let half = jitter_ms / 2;
    let r = rand::thread_rng().gen_range(0..jitter_ms.max(1));
    Duration::from_millis(delay_ms - half + r)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn read(
        &self,
        key: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        {
            let guard = self.inner.read().await;
            if guard.closed || !guard.active {
                return Ok(None);
            }
            match guard.values.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.payload.clone()))
                }
                Some(_) => {}
            }
        }
        // Lazy expiry: drop the shared lock and re-acquire exclusive. A
        // re-arrival of the key here means another thread wrote a fresher
        // value; evicting that is benign-but-wasteful, never incorrect.
        let mut guard = self.inner.write().await;
        guard.values.remove(key);
        Ok(None)
    }

    async fn write(
        &self,
        key: &str,
        value: Option<&[u8]>,
        _cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.closed || !guard.active {
            return Ok(());
        }
        match value {
            None => {
                guard.values.remove(key);
                drop(guard);
                self.publish_invalidation("", key).await;
            }
            Some(bytes) => {
                let hash = Self::digest(bytes);
                guard.values.insert(
                    key.to_string(),
                    Entry {
                        payload: bytes.to_vec(),
                        hash: hash.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                drop(guard);
                self.publish_invalidation(&hash, key).await;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        {
            let mut guard = self.inner.write().await;
            guard.closed = true;
            guard.active = false;
        }
        if !self.close_started.swap(true, Ordering::SeqCst) {
            self.logger.debug("closing memory store");
            self.cancel.cancel();
            let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
            for task in tasks {
                task.abort();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::LocalPubSub;

    async fn active_store(pubsub: Arc<LocalPubSub>, ttl: Duration) -> Arc<MemoryStore> {
        let store = MemoryStore::new(pubsub, MemoryStoreConfig { ttl }, Arc::new(crate::NoopLogger));
        for _ in 0..200 {
            if store.is_active().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.is_active().await, "store never activated");
        store
    }

    #[tokio::test]
    async fn inactive_store_is_a_silent_no_op() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = MemoryStore::new(pubsub, MemoryStoreConfig::default(), Arc::new(crate::NoopLogger));
        let cancel = CancellationToken::new();
        // Racing the activation window: before it flips, both are no-ops.
        let _ = store.write("k", Some(b"v"), &cancel).await;
        assert_eq!(store.read("k", &cancel).await.unwrap(), None);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn round_trips_through_active_store() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = active_store(pubsub, Duration::from_secs(60)).await;
        let cancel = CancellationToken::new();

        store.write("k", Some(b"hello"), &cancel).await.unwrap();
        assert_eq!(store.read("k", &cancel).await.unwrap(), Some(b"hello".to_vec()));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = active_store(pubsub, Duration::from_secs(60)).await;
        let cancel = CancellationToken::new();

        store.write("k", Some(b"hello"), &cancel).await.unwrap();
        store.write("k", None, &cancel).await.unwrap();
        assert_eq!(store.read("k", &cancel).await.unwrap(), None);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn self_echo_does_not_evict_fresh_write() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = active_store(pubsub, Duration::from_secs(60)).await;
        let cancel = CancellationToken::new();

        store.write("k", Some(b"hello"), &cancel).await.unwrap();
        // Give the published invalidation a moment to loop back.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.read("k", &cancel).await.unwrap(), Some(b"hello".to_vec()));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn cross_process_invalidation_evicts() {
        let pubsub = Arc::new(LocalPubSub::new());
        let m1 = active_store(pubsub.clone(), Duration::from_secs(60)).await;
        let m2 = active_store(pubsub, Duration::from_secs(60)).await;
        let cancel = CancellationToken::new();

        m2.write("k", Some(b"old"), &cancel).await.unwrap();
        assert_eq!(m2.read("k", &cancel).await.unwrap(), Some(b"old".to_vec()));

        m1.write("k", Some(b"new"), &cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(m2.read("k", &cancel).await.unwrap(), None);

        m1.close().await.unwrap();
        m2.close().await.unwrap();
    }

    #[tokio::test]
    async fn ttl_eviction() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = active_store(pubsub, Duration::from_millis(20)).await;
        let cancel = CancellationToken::new();

        store.write("k", Some(b"hello"), &cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.read("k", &cancel).await.unwrap(), None);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_terminal() {
        let pubsub = Arc::new(LocalPubSub::new());
        let store = active_store(pubsub, Duration::from_secs(60)).await;
        let cancel = CancellationToken::new();

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.read("k", &cancel).await.unwrap(), None);
        let _ = store.write("k", Some(b"v"), &cancel).await;
        assert_eq!(store.read("k", &cancel).await.unwrap(), None);
    }
}
