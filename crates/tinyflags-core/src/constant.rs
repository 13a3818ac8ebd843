use crate::error::StoreError;
use crate::store::{check_cancelled, Store};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Builds a [`ConstantStore`] from a fixed set of seed values. A seed value
/// that fails to marshal to JSON surfaces as a `serde_json::Error` at
/// construction time rather than panicking.
#[derive(Default)]
pub struct ConstantStoreBuilder {
    values: HashMap<String, Vec<u8>>,
}

impl ConstantStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(&value)?;
        self.values.insert(key.into(), bytes);
        Ok(self)
    }

    pub fn build(self) -> ConstantStore {
        ConstantStore {
            values: RwLock::new(self.values),
        }
    }
}

/// Read-only in-memory seed of preloaded values. Writes are always silently
/// dropped; intended as the terminal default-value tier at the root of a
/// [`crate::Manager`]'s tier list.
pub struct ConstantStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl ConstantStore {
    pub fn builder() -> ConstantStoreBuilder {
        ConstantStoreBuilder::new()
    }
}

#[async_trait::async_trait]
impl Store for ConstantStore {
    async fn read(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        check_cancelled(cancel)?;
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn write(
        &self,
        _key: &str,
        _value: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancelled(cancel)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_seeded_value() {
        let store = ConstantStore::builder()
            .with("language", "en")
            .unwrap()
            .with("reduced_motion", true)
            .unwrap()
            .build();
        let cancel = CancellationToken::new();

        let v = store.read("language", &cancel).await.unwrap().unwrap();
        assert_eq!(v, serde_json::to_vec("en").unwrap());
        assert_eq!(store.read("missing", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_are_silent_no_ops() {
        let store = ConstantStore::builder().build();
        let cancel = CancellationToken::new();

        store
            .write("language", Some(b"\"en\""), &cancel)
            .await
            .unwrap();
        assert_eq!(store.read("language", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_token_surfaces_as_cancelled_error() {
        let store = ConstantStore::builder()
            .with("language", "en")
            .unwrap()
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            store.read("language", &cancel).await,
            Err(StoreError::Cancelled)
        ));
        assert!(matches!(
            store.write("language", None, &cancel).await,
            Err(StoreError::Cancelled)
        ));
    }
}
