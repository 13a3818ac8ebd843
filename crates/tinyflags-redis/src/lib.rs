//! Redis-backed collaborators for tinyflags: the Remote Cache Store tier and
//! the `PubSub` transport that keeps every process's Memory Store coherent.
//! Both ride a reconnecting `ConnectionManager` for commands, with a
//! dedicated connection for the long-lived subscription.

mod pubsub;
mod remote_cache;

pub use pubsub::{MemoryStoreConfig, RedisPubSub};
pub use remote_cache::{RemoteCacheConfig, RemoteCacheStore};
