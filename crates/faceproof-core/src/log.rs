//! Tagged logging routed through `tracing`.
//!
//! Debug output is opt-in per context instead of a process-global switch;
//! the pipeline derives a request-scoped context from its own and the
//! request's [`crate::PipelineConfig`].

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogContext {
    debug_enabled: bool,
}

impl LogContext {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    /// Copy with debug output additionally enabled when `enable` is set.
    pub fn with_debug(self, enable: bool) -> Self {
        Self {
            debug_enabled: self.debug_enabled || enable,
        }
    }

    pub fn debug(&self, tag: &str, message: impl Display) {
        if self.debug_enabled {
            tracing::debug!(tag, "{message}");
        }
    }

    pub fn info(&self, tag: &str, message: impl Display) {
        tracing::info!(tag, "{message}");
    }

    pub fn warn(&self, tag: &str, message: impl Display) {
        tracing::warn!(tag, "{message}");
    }

    pub fn error(&self, tag: &str, message: impl Display) {
        tracing::error!(tag, "{message}");
    }
}
