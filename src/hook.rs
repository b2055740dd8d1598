//! Hook subsystem (spec.md §4.5): external processes launched on dispatched
//! events, argv laid out per spec.md §6 (`hook <event> <server> [<origin>
//! [<channel> [<param>…]]]`).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::event::Event;

#[derive(Debug, Clone, Default)]
pub struct HookTable {
    hooks: BTreeMap<String, PathBuf>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> impl Iterator<Item = (&str, &PathBuf)> {
        self.hooks.iter().map(|(id, path)| (id.as_str(), path))
    }

    pub fn add(&mut self, id: impl Into<String>, path: PathBuf) {
        self.hooks.insert(id.into(), path);
    }

    pub fn remove(&mut self, id: &str) -> Result<(), PluginError> {
        self.hooks.remove(id).map(|_| ()).ok_or_else(|| PluginError::NotFound(id.to_string()))
    }

    /// Launches every registered hook for `event`, without awaiting
    /// completion (spec.md §4.5: "the bot does not block"). Each child's
    /// stdout/stderr is captured and forwarded to the log on exit.
    pub fn fire(&self, event: &Event) {
        let argv = build_argv(event);

        for (id, path) in &self.hooks {
            let id = id.clone();
            let path = path.clone();
            let argv = argv.clone();

            tokio::spawn(async move {
                let mut command = Command::new(&path);
                command.args(&argv).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

                match command.output().await {
                    Ok(output) => {
                        if !output.stdout.is_empty() {
                            info!(hook = %id, "{}", String::from_utf8_lossy(&output.stdout).trim_end());
                        }
                        if !output.stderr.is_empty() {
                            warn!(hook = %id, "{}", String::from_utf8_lossy(&output.stderr).trim_end());
                        }
                    }
                    Err(err) => warn!(hook = %id, path = %path.display(), error = %err, "hook spawn failed"),
                }
            });
        }
    }
}

/// Event-specific fixed-position argv, per spec.md §6's `onMessage <server>
/// <origin> <channel> <message>` example generalized to every event kind.
fn build_argv(event: &Event) -> Vec<String> {
    let mut argv = vec![event.handler_name().to_string(), event.server().to_string()];

    match event {
        Event::Connect { .. } | Event::Disconnect { .. } => {}
        Event::Invite { origin, channel, .. } | Event::Join { origin, channel, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
        }
        Event::Kick { origin, channel, target, reason, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(target.clone());
            argv.push(reason.clone());
        }
        Event::Me { origin, channel, message, .. } | Event::Message { origin, channel, message, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(message.clone());
        }
        Event::Mode { origin, channel, mode, args, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(mode.clone());
            argv.extend(args.iter().cloned());
        }
        Event::Names { channel, names, .. } => {
            argv.push(channel.clone());
            argv.extend(names.iter().cloned());
        }
        Event::Nick { origin, nickname, .. } => {
            argv.push(origin.clone());
            argv.push(nickname.clone());
        }
        Event::Notice { origin, message, .. } => {
            argv.push(origin.clone());
            argv.push(message.clone());
        }
        Event::Part { origin, channel, reason, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(reason.clone());
        }
        Event::Topic { origin, channel, topic, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(topic.clone());
        }
        Event::Whois { nickname, username, hostname, realname, .. } => {
            argv.push(nickname.clone());
            argv.push(username.clone());
            argv.push(hostname.clone());
            argv.push(realname.clone());
        }
        Event::Command { origin, channel, plugin, message, .. } => {
            argv.push(origin.clone());
            argv.push(channel.clone());
            argv.push(plugin.clone());
            argv.push(message.clone());
        }
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_argv_layout() {
        let ev = Event::Message {
            server: "libera".into(),
            origin: "jean".into(),
            channel: "#test".into(),
            message: "hi".into(),
        };
        assert_eq!(build_argv(&ev), vec!["onMessage", "libera", "jean", "#test", "hi"]);
    }

    #[test]
    fn remove_missing_hook_errors() {
        let mut table = HookTable::new();
        assert!(table.remove("nope").is_err());
    }
}
