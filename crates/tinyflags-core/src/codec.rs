use crate::error::CodecError;

/// The external contract a typed flag handle must satisfy for a [`crate::Manager`]
/// to read and write it.
///
/// `key()` must be stable for the handle's lifetime. `encode()` fails with
/// [`CodecError::Unset`] if the handle carries no assigned value yet.
/// `decode()` assigns the handle's value and marks it set on success.
pub trait Codec {
    fn key(&self) -> &str;
    fn encode(&self) -> Result<Vec<u8>, CodecError>;
    fn decode(&mut self, bytes: &[u8]) -> Result<(), CodecError>;
}
