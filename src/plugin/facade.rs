//! The façade plugins call back through (spec.md §4.3(b-e)): per-server IRC
//! actions, logging, timers, and filesystem helpers. DESIGN NOTES §9
//! ("Cyclic references"): this holds a shared, lock-protected view of the
//! server table and a timer sink, never a direct `&mut Bot` — a plugin that
//! captured a server id across a timer tick resolves it fresh on each call
//! and gets `ServerError::NotFound` if the bot tore it down meanwhile.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::logging::{Level, Logger};
use crate::server::SharedServerTable;

/// One-shot or periodic (spec.md §4.3 Timer primitive; DESIGN NOTES §9
/// "Coroutine-style plugin code": no `await` exposed to plugins, only this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Single,
    Periodic,
}

/// Sink a facade posts `TimerFired` notifications through. Implemented by
/// the bot's dispatcher so `plugin::facade` never needs to know the
/// dispatcher's message enum (avoids a `plugin <-> bot` module cycle).
pub trait TimerSink: Send + Sync {
    fn fire(&self, plugin: &str, timer_id: u64);
}

#[derive(Debug, Clone)]
pub struct TimerHandle {
    pub id: u64,
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct BotFacade {
    servers: SharedServerTable,
    logger: Arc<dyn Logger>,
    timer_sink: Arc<dyn TimerSink>,
    next_timer_id: AtomicU64,
}

impl BotFacade {
    pub fn new(servers: SharedServerTable, logger: Arc<dyn Logger>, timer_sink: Arc<dyn TimerSink>) -> Self {
        BotFacade { servers, logger, timer_sink, next_timer_id: AtomicU64::new(1) }
    }

    /// Ids of every server the bot currently knows about (spec.md §4.3(a)).
    pub fn server_ids(&self) -> Vec<String> {
        self.servers.read().expect("server table poisoned").keys().cloned().collect()
    }

    fn resolve(&self, server: &str) -> Result<crate::server::ServerHandle, ServerError> {
        self.servers
            .read()
            .expect("server table poisoned")
            .get(server)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(server.to_string()))
    }

    fn raw(&self, server: &str, line: String) -> Result<(), ServerError> {
        let handle = self.resolve(server)?;
        handle.try_send_raw(line).map_err(|_| ServerError::NotConnected(server.to_string()))
    }

    pub fn send(&self, server: &str, raw: &str) -> Result<(), ServerError> {
        self.raw(server, raw.to_string())
    }

    pub fn message(&self, server: &str, target: &str, text: &str) -> Result<(), ServerError> {
        self.raw(server, format!("PRIVMSG {target} :{text}"))
    }

    pub fn notice(&self, server: &str, target: &str, text: &str) -> Result<(), ServerError> {
        self.raw(server, format!("NOTICE {target} :{text}"))
    }

    /// CTCP ACTION (spec.md §6: "wrapping payloads in `\x01...\x01`").
    pub fn me(&self, server: &str, target: &str, text: &str) -> Result<(), ServerError> {
        self.raw(server, format!("PRIVMSG {target} :\x01ACTION {text}\x01"))
    }

    pub fn join(&self, server: &str, channel: &str, key: Option<&str>) -> Result<(), ServerError> {
        match key {
            Some(key) => self.raw(server, format!("JOIN {channel} {key}")),
            None => self.raw(server, format!("JOIN {channel}")),
        }
    }

    pub fn part(&self, server: &str, channel: &str, reason: Option<&str>) -> Result<(), ServerError> {
        match reason {
            Some(reason) => self.raw(server, format!("PART {channel} :{reason}")),
            None => self.raw(server, format!("PART {channel}")),
        }
    }

    pub fn kick(&self, server: &str, channel: &str, target: &str, reason: Option<&str>) -> Result<(), ServerError> {
        match reason {
            Some(reason) => self.raw(server, format!("KICK {channel} {target} :{reason}")),
            None => self.raw(server, format!("KICK {channel} {target}")),
        }
    }

    pub fn invite(&self, server: &str, target: &str, channel: &str) -> Result<(), ServerError> {
        self.raw(server, format!("INVITE {target} {channel}"))
    }

    pub fn mode(&self, server: &str, target: &str, mode: &str, args: &[String]) -> Result<(), ServerError> {
        let mut line = format!("MODE {target} {mode}");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.raw(server, line)
    }

    pub fn names(&self, server: &str, channel: &str) -> Result<(), ServerError> {
        self.raw(server, format!("NAMES {channel}"))
    }

    pub fn topic(&self, server: &str, channel: &str, topic: &str) -> Result<(), ServerError> {
        self.raw(server, format!("TOPIC {channel} :{topic}"))
    }

    pub fn whois(&self, server: &str, target: &str) -> Result<(), ServerError> {
        self.raw(server, format!("WHOIS {target}"))
    }

    pub fn nick(&self, server: &str, nickname: &str) -> Result<(), ServerError> {
        self.raw(server, format!("NICK {nickname}"))
    }

    pub fn log_debug(&self, plugin: &str, message: &str) {
        self.logger.log(Level::Debug, Some(plugin), message);
    }

    pub fn log_info(&self, plugin: &str, message: &str) {
        self.logger.log(Level::Info, Some(plugin), message);
    }

    pub fn log_warning(&self, plugin: &str, message: &str) {
        self.logger.log(Level::Warning, Some(plugin), message);
    }

    /// Schedules `plugin`'s timer callback to fire after `delay_ms`, once
    /// (`Single`) or every `delay_ms` (`Periodic`), by spawning a task that
    /// posts back to the dispatcher through `timer_sink` — the loop itself
    /// never blocks on plugin code (spec.md §4.1).
    pub fn start_timer(&self, plugin: &str, kind: TimerKind, delay_ms: u64) -> TimerHandle {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let sink = self.timer_sink.clone();
        let plugin = plugin.to_string();
        let delay = Duration::from_millis(delay_ms.max(1));
        let token = cancel.clone();

        tokio::spawn(async move {
            match kind {
                TimerKind::Single => {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => sink.fire(&plugin, id),
                    }
                }
                TimerKind::Periodic => {
                    let mut interval = tokio::time::interval(delay);
                    interval.tick().await;
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = interval.tick() => sink.fire(&plugin, id),
                        }
                    }
                }
            }
        });

        TimerHandle { id, cancel }
    }

    /// Plain filesystem helpers (spec.md §4.3(e)), synchronous because
    /// plugin handlers run to completion without yielding to the loop.
    pub fn file_read(&self, path: &std::path::Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    pub fn file_write(&self, path: &std::path::Path, contents: &str) -> std::io::Result<()> {
        std::fs::write(path, contents)
    }

    pub fn file_exists(&self, path: &std::path::Path) -> bool {
        path.exists()
    }

    pub fn directory_list(&self, path: &std::path::Path) -> std::io::Result<Vec<String>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::TracingLogger;
    use std::collections::BTreeMap;
    use std::sync::{Arc, RwLock};

    struct NullSink;
    impl TimerSink for NullSink {
        fn fire(&self, _plugin: &str, _timer_id: u64) {}
    }

    #[test]
    fn unknown_server_is_not_found() {
        let servers: SharedServerTable = Arc::new(RwLock::new(BTreeMap::new()));
        let facade = BotFacade::new(servers, Arc::new(TracingLogger), Arc::new(NullSink));
        assert!(matches!(facade.message("nope", "#c", "hi"), Err(ServerError::NotFound(_))));
    }

    #[test]
    fn server_ids_reflect_table() {
        let servers: SharedServerTable = Arc::new(RwLock::new(BTreeMap::new()));
        let facade = BotFacade::new(servers, Arc::new(TracingLogger), Arc::new(NullSink));
        assert!(facade.server_ids().is_empty());
    }
}
