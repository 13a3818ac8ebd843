/// Error/debug sink the core depends on to surface back-fill failures, store
/// close failures and subscriber recovery progress. Writes are fire-and-forget
/// and must never panic the caller.
///
/// Passed explicitly into [`crate::Manager::new`] and every store
/// constructor that needs one; there is no global singleton.
pub trait Logger: Send + Sync {
    fn error(&self, msg: &str);

    fn debug(&self, _msg: &str) {}
}

/// Routes to `tracing`, matching how the rest of this workspace logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }
}

/// Discards everything. Useful as a default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn error(&self, _msg: &str) {}
}
