use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Per-session state the planner and analyzer run against.
///
/// A context is owned by a single session: plan building, analysis, and
/// lookup construction assume exclusive access. The cancellation token is the
/// one piece that may be flipped from another thread.
#[derive(Debug, Clone)]
pub struct SessionContext {
    current_database: String,
    cancelled: Arc<AtomicBool>,
    config: EngineConfig,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Creates a context with no database selected and default configuration.
    pub fn new() -> Self {
        Self {
            current_database: String::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            config: EngineConfig::default(),
        }
    }

    /// Sets the current database.
    pub fn with_current_database(mut self, db: impl Into<String>) -> Self {
        self.current_database = db.into();
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The session's current database; empty when none is selected.
    pub fn current_database(&self) -> &str {
        &self.current_database
    }

    /// The session's engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A handle that cancels this context when flipped.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Cancels the context. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns [`Error::ContextCancelled`] once the context is cancelled.
    ///
    /// The analyzer calls this at every rule boundary.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(Error::ContextCancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_cancelled_trips_after_cancel() {
        let ctx = SessionContext::new();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(Error::ContextCancelled)));
    }

    #[test]
    fn token_shares_state_across_clones() {
        let ctx = SessionContext::new().with_current_database("db");
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.check_cancelled().is_err());
        assert_eq!(clone.current_database(), "db");
    }
}
