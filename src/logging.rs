//! Logging façade (DESIGN NOTES §9 "Global mutable services"): a `Logger`
//! trait installed once at construction so no subsystem reaches for a
//! process-wide static. `main()` is the only place that wires a concrete
//! implementation to the global `tracing` dispatcher.

use std::sync::Arc;

/// The three levels spec.md §7 defines, plus `Warning` is what plugin
/// handler exceptions are logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warning,
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, plugin: Option<&str>, message: &str);
}

/// Default logger: forwards to `tracing`, tagging the `plugin` field when
/// the message originates from a plugin call (`Irccd.Logger.*` in the JS
/// API, or a native plugin's `irccd_log_*`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, plugin: Option<&str>, message: &str) {
        match (level, plugin) {
            (Level::Debug, Some(p)) => tracing::debug!(plugin = p, "{message}"),
            (Level::Debug, None) => tracing::debug!("{message}"),
            (Level::Info, Some(p)) => tracing::info!(plugin = p, "{message}"),
            (Level::Info, None) => tracing::info!("{message}"),
            (Level::Warning, Some(p)) => tracing::warn!(plugin = p, "{message}"),
            (Level::Warning, None) => tracing::warn!("{message}"),
        }
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}
