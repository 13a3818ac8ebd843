use crate::codec::Codec;
use crate::error::CodecError;
use serde::{de::DeserializeOwned, Serialize};

/// A typed, keyed configuration value. `Flag<V>` is the library's concrete
/// realization of the external flag-handle contract described by [`Codec`].
///
/// A freshly constructed flag is unset: [`Flag::encode`] fails until
/// [`Flag::set`] or [`Flag::with`] assigns a value, or a [`crate::Manager::read`]
/// call absorbs one from a store.
#[derive(Debug, Clone)]
pub struct Flag<V> {
    key: String,
    set: bool,
    value: V,
}

impl<V: Default> Flag<V> {
    pub fn new(key: impl Into<String>) -> Self {
        Flag {
            key: key.into(),
            set: false,
            value: V::default(),
        }
    }
}

impl<V> Flag<V> {
    /// Returns a copy of this flag carrying `value`, marked set.
    pub fn with(mut self, value: V) -> Self {
        self.set = true;
        self.value = value;
        self
    }

    /// Assigns `value` in place, marking the flag set.
    pub fn set(&mut self, value: V) {
        self.set = true;
        self.value = value;
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    pub fn into_inner(self) -> V {
        self.value
    }

    pub fn is_set(&self) -> bool {
        self.set
    }
}

impl<V: Serialize + DeserializeOwned> Codec for Flag<V> {
    fn key(&self) -> &str {
        &self.key
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if !self.set {
            return Err(CodecError::Unset);
        }
        Ok(serde_json::to_vec(&self.value)?)
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.value = serde_json::from_slice(bytes)?;
        self.set = true;
        Ok(())
    }
}

pub type BoolFlag = Flag<bool>;
pub type I32Flag = Flag<i32>;
pub type I64Flag = Flag<i64>;
pub type F32Flag = Flag<f32>;
pub type F64Flag = Flag<f64>;
pub type StringFlag = Flag<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flag_fails_to_encode() {
        let f = BoolFlag::new("rate_limit");
        assert!(matches!(f.encode(), Err(CodecError::Unset)));
    }

    #[test]
    fn round_trips_through_json() {
        let mut f = StringFlag::new("language").with("en".to_string());
        let bytes = f.encode().unwrap();
        let mut f2 = StringFlag::new("language");
        f2.decode(&bytes).unwrap();
        assert!(f2.is_set());
        assert_eq!(f2.get(), "en");
        assert_eq!(bytes, f.encode().unwrap());
        let _ = f.key();
    }

    #[test]
    fn key_is_immutable() {
        let f = I32Flag::new("max_connections").with(8);
        assert_eq!(f.key(), "max_connections");
    }
}
