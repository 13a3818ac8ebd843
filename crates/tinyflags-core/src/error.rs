/// Errors raised by a [`crate::Codec`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("tried to encode an unset flag; call Flag::set or Flag::with first")]
    Unset,
    #[error("failed to decode flag value: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised by a [`crate::Store`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("durable store migration failed and will not be retried: {0}")]
    Migration(#[source] std::sync::Arc<anyhow::Error>),
    #[error("operation was cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Transport(err.into())
    }
}

/// Errors raised by [`crate::Manager::read`] / [`crate::Manager::write`] / [`crate::Manager::close`].
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("flag argument is not a valid handle: {0}")]
    Validation(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
