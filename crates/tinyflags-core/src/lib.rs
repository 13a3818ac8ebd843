//! Tiered read-through / write-through flag store.
//!
//! A [`Manager`] composes an ordered list of [`Store`] implementations into a
//! single coherent view, reading from the fastest tier that has a value and
//! back-filling the tiers in front of it, and writing to every tier
//! durable-first. [`MemoryStore`] is the process-local fast tier; it stays
//! coherent across processes via a [`PubSub`] invalidation channel.

mod codec;
mod constant;
mod error;
mod flag;
mod logger;
mod manager;
mod memory;
mod pubsub;
mod store;

pub use codec::Codec;
pub use constant::{ConstantStore, ConstantStoreBuilder};
pub use error::{CodecError, ManagerError, StoreError};
pub use flag::{BoolFlag, F32Flag, F64Flag, Flag, I32Flag, I64Flag, StringFlag};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use manager::Manager;
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use pubsub::{InvalidationMessage, LocalPubSub, PubSub, Subscription, INVALIDATIONS_CHANNEL};
pub use store::{check_cancelled, run_cancellable, Store};
