use crate::codec::Codec;
use crate::error::ManagerError;
use crate::logger::Logger;
use crate::store::Store;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Orders an owned list of [`Store`] references from fastest/least-durable
/// (index 0) to most authoritative (last index), and orchestrates
/// read-through hydration and write-through fan-out across them.
///
/// The `Manager` owns the tier list but not the stores themselves — a store
/// may be shared across several managers.
pub struct Manager {
    stores: Vec<Arc<dyn Store>>,
    logger: Arc<dyn Logger>,
    closed: AtomicBool,
}

impl Manager {
    pub fn new(stores: Vec<Arc<dyn Store>>, logger: Arc<dyn Logger>) -> Self {
        Manager {
            stores,
            logger,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), ManagerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ManagerError::Validation(
                "manager has been closed and must not be reused".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads every flag from the closest tier that has it, back-filling every
    /// nearer tier with the bytes it found. Duplicate keys among `flags` are
    /// resolved independently; flags sharing a key are all filled from the
    /// same tier hit. Unresolved flags at the end retain their prior value.
    ///
    /// Fails fast: the first transport error from any store aborts the call
    /// immediately, discarding any hits already made in this pass. The first
    /// decode error aborts the call without back-filling the offending bytes.
    pub async fn read(
        &self,
        flags: &mut [&mut dyn Codec],
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        self.ensure_open()?;
        if flags.is_empty() {
            return Ok(());
        }

        let mut remaining: HashSet<usize> = (0..flags.len()).collect();
        for (tier_idx, store) in self.stores.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            let current: Vec<usize> = remaining.iter().copied().collect();
            for flag_idx in current {
                let key = flags[flag_idx].key().to_string();
                let bytes = store.read(&key, cancel).await?;
                let Some(bytes) = bytes else { continue };

                flags[flag_idx].decode(&bytes)?;
                remaining.remove(&flag_idx);

                for earlier in &self.stores[..tier_idx] {
                    if let Err(err) = earlier.write(&key, Some(&bytes), cancel).await {
                        self.logger
                            .error(&format!("back-fill write for '{key}' failed: {err}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Encodes every handle eagerly; any encode failure aborts before any
    /// store is touched. Writes durable tiers first (last index to 0) so a
    /// subsequent read is more likely to hit the freshest value in the
    /// memory tier. Every store is attempted regardless of earlier
    /// failures; the last error is returned.
    pub async fn write(
        &self,
        flags: &[&dyn Codec],
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        self.ensure_open()?;
        if flags.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(flags.len());
        for flag in flags {
            encoded.push((flag.key().to_string(), flag.encode()?));
        }

        let mut last_err = None;
        for store in self.stores.iter().rev() {
            for (key, bytes) in &encoded {
                if let Err(err) = store.write(key, Some(bytes), cancel).await {
                    self.logger
                        .error(&format!("write to store failed for '{key}': {err}"));
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Deletes `key` from every tier, durable tiers first, best-effort like
    /// [`Manager::write`]. `Codec` has no delete operation of its own —
    /// `Flag::encode` always produces the JSON encoding of a set value,
    /// never a nil/delete sentinel — so deletion is exposed directly on
    /// `Manager` instead of being smuggled through a flag's encoded bytes.
    pub async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<(), ManagerError> {
        self.ensure_open()?;
        let mut last_err = None;
        for store in self.stores.iter().rev() {
            if let Err(err) = store.write(key, None, cancel).await {
                self.logger
                    .error(&format!("delete from store failed for '{key}': {err}"));
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Closes every store, last index to 0, collecting the last error. A
    /// closed Manager must not be reused.
    pub async fn close(&self) -> Result<(), ManagerError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut last_err = None;
        for store in self.stores.iter().rev() {
            if let Err(err) = store.close().await {
                self.logger.error(&format!("closing store failed: {err}"));
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
