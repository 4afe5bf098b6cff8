//! Pipeline context: term registry, interner, and cancellation.
//!
//! A context is cheap to clone and is threaded through every pass. The
//! registry it carries is read-only; the cancellation flag may be set
//! from outside and is checked between attribute visits by the
//! long-running passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::interner::Interner;
use crate::term::TermRegistry;

#[derive(Debug, Clone)]
pub struct Context {
    registry: Arc<TermRegistry>,
    cancelled: Arc<AtomicBool>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context with the built-in term registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TermRegistry::with_builtins()))
    }

    /// A context over a caller-built registry (external validators
    /// must be registered before the compile pass runs).
    pub fn with_registry(registry: Arc<TermRegistry>) -> Self {
        Context {
            registry,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> &TermRegistry {
        &self.registry
    }

    pub fn interner(&self) -> &Interner {
        self.registry.interner()
    }

    /// A handle that cancels this context when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns [`Error::Cancelled`] once the flag is set.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
