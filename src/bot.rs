//! Dispatcher / composition root (spec.md §4.1, §5 "single-threaded
//! cooperative reactor"). `Bot` owns every piece of mutable state — server
//! handles, channel membership, loaded plugins, rules, hooks, transport
//! watchers — and is driven entirely from [`Bot::run`]'s `select!` loop on
//! a single task, so no lock is needed around any of it (DESIGN NOTES §9
//! "Global mutable services" / "Cyclic references").
//!
//! Grounded on the teacher's `server/mod.rs` subscriber-fan-out shape
//! (`examples/plsuwu-pea-fan/server/mod.rs`) generalized from "one Twitch
//! channel's subscriber list" to "every server/plugin/transport-watcher the
//! bot currently owns".

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, PluginConfig, ServerConfig};
use crate::error::{BotError, BotResult, PluginError, ServerError};
use crate::event::Event;
use crate::hook::HookTable;
use crate::irc::IrcMessage;
use crate::logging::Logger;
use crate::plugin::{BotFacade, LoaderChain, PluginMaps, PluginRegistry, TimerSink};
use crate::rule::{Action, Dispatch, RuleList};
use crate::server::{self, ChannelTable, Prefix, ServerHandle, ServerInbound, SharedServerTable, State};

/// One request routed from a transport client into the dispatcher
/// (spec.md §4.6/§4.7). `watch_sender` is always attached — only the
/// `watch` command handler actually keeps it.
pub enum BotRequest {
    Command {
        command: String,
        body: Value,
        watch_sender: mpsc::UnboundedSender<Event>,
        respond: oneshot::Sender<BotResult<Value>>,
    },
    /// Config file changed on disk (`bin/irccd.rs`'s `notify` watcher);
    /// rules and hooks are rebuilt from it in place.
    ReloadConfig(Box<Config>),
}

struct ChannelTimerSink(mpsc::UnboundedSender<(String, u64)>);

impl TimerSink for ChannelTimerSink {
    fn fire(&self, plugin: &str, timer_id: u64) {
        let _ = self.0.send((plugin.to_string(), timer_id));
    }
}

pub struct Bot {
    servers: SharedServerTable,
    server_configs: BTreeMap<String, ServerConfig>,
    channels: BTreeMap<String, ChannelTable>,
    states: BTreeMap<String, State>,
    plugins: PluginRegistry,
    plugin_configs: BTreeMap<String, PluginConfig>,
    loaders: LoaderChain,
    plugin_paths: Vec<PathBuf>,
    rules: RuleList,
    hooks: HookTable,
    facade: Arc<BotFacade>,
    logger: Arc<dyn Logger>,
    watchers: Vec<mpsc::UnboundedSender<Event>>,
    inbound_tx: mpsc::Sender<ServerInbound>,
    inbound_rx: mpsc::Receiver<ServerInbound>,
    timer_rx: mpsc::UnboundedReceiver<(String, u64)>,
    requests_rx: mpsc::Receiver<BotRequest>,
}

impl Bot {
    /// Builds the bot from a loaded [`Config`], spawning every configured
    /// server's connection task and loading every configured plugin.
    /// Returns the request sender the transport layer uses to reach it.
    pub fn from_config(config: Config, logger: Arc<dyn Logger>) -> (Bot, mpsc::Sender<BotRequest>) {
        let servers: SharedServerTable = Arc::new(RwLock::new(BTreeMap::new()));
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::channel(256);

        let facade = Arc::new(BotFacade::new(servers.clone(), logger.clone(), Arc::new(ChannelTimerSink(timer_tx))));

        let mut server_configs = BTreeMap::new();
        let mut channels = BTreeMap::new();
        let mut states = BTreeMap::new();

        {
            let mut table = servers.write().expect("server table poisoned");
            for server_config in &config.servers {
                let handle = server::conn::spawn(server_config.clone(), inbound_tx.clone());
                states.insert(server_config.id.clone(), State::Disconnected);
                channels.insert(server_config.id.clone(), ChannelTable::new());
                server_configs.insert(server_config.id.clone(), server_config.clone());
                table.insert(server_config.id.clone(), handle);
            }
        }

        let plugin_paths = config.general.plugin_paths.clone();
        let loaders = LoaderChain::with_defaults(plugin_paths.clone());
        let mut plugins = PluginRegistry::new();
        let mut plugin_configs = BTreeMap::new();

        for plugin_config in &config.plugins {
            let maps = PluginMaps {
                options: plugin_config.options.clone(),
                templates: plugin_config.templates.clone(),
                paths: plugin_config.paths.clone(),
            };
            match loaders.resolve(&plugin_config.id, plugin_config.location.as_deref(), maps) {
                Ok(mut plugin) => {
                    if let Err(err) = plugin.on_load(&facade) {
                        tracing::warn!(plugin = %plugin_config.id, error = %err, "plugin onLoad raised an error");
                    }
                    if let Err(err) = plugins.insert(plugin_config.id.clone(), plugin) {
                        tracing::warn!(plugin = %plugin_config.id, error = %err, "plugin registration failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(plugin = %plugin_config.id, error = %err, "plugin load failed");
                }
            }
            plugin_configs.insert(plugin_config.id.clone(), plugin_config.clone());
        }

        let mut rules = RuleList::new();
        for rule in &config.rules {
            rules.add(rule.clone(), None);
        }

        let mut hooks = HookTable::new();
        for hook in &config.hooks {
            hooks.add(hook.id.clone(), hook.path.clone());
        }

        let bot = Bot {
            servers,
            server_configs,
            channels,
            states,
            plugins,
            plugin_configs,
            loaders,
            plugin_paths,
            rules,
            hooks,
            facade,
            logger,
            watchers: Vec::new(),
            inbound_tx,
            inbound_rx,
            timer_rx,
            requests_rx,
        };

        (bot, requests_tx)
    }

    /// The dispatcher's run loop (spec.md §4.1): everything in this process
    /// happens on this one task. No branch here ever awaits plugin code.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(msg) = self.inbound_rx.recv() => self.handle_inbound(msg),
                Some((plugin_id, timer_id)) = self.timer_rx.recv() => self.handle_timer(&plugin_id, timer_id),
                Some(request) = self.requests_rx.recv() => self.handle_request(request),
                else => {
                    tracing::info!("dispatcher has no more live input channels, shutting down");
                    break;
                }
            }
        }
    }

    fn handle_timer(&mut self, plugin_id: &str, timer_id: u64) {
        if let Some(plugin) = self.plugins.get_mut(plugin_id) {
            plugin.fire_timer(timer_id, &self.facade);
        }
    }

    fn handle_request(&mut self, request: BotRequest) {
        match request {
            BotRequest::Command { command, body, watch_sender, respond } => {
                let result = crate::command::dispatch(self, &command, &body, watch_sender);
                let _ = respond.send(result);
            }
            BotRequest::ReloadConfig(config) => {
                self.reload_rules_and_hooks(&config);
                tracing::info!("reloaded rules and hooks from configuration");
            }
        }
    }

    fn handle_inbound(&mut self, msg: ServerInbound) {
        match msg {
            ServerInbound::StateChanged { server, state } => {
                self.states.insert(server.clone(), state);
                match state {
                    State::Connected => self.dispatch_event(Event::Connect { server }),
                    State::Stopped => self.dispatch_event(Event::Disconnect { server }),
                    _ => {}
                }
            }
            ServerInbound::Message { server, message } => self.handle_irc_message(server, message),
        }
    }

    fn handle_irc_message(&mut self, server: String, message: IrcMessage) {
        let origin = message.nickname().unwrap_or("").to_string();
        let prefix = self.server_configs.get(&server).map(|c| c.prefix.clone()).unwrap_or_else(|| "!".to_string());

        let event = match message.command.as_str() {
            "JOIN" => {
                let channel = message.param(0).unwrap_or_default().to_string();
                self.channels.entry(server.clone()).or_default().entry(&channel).add_member(&origin, Prefix::None);
                Some(Event::Join { server, origin, channel })
            }
            "PART" => {
                let channel = message.param(0).unwrap_or_default().to_string();
                if let Some(table) = self.channels.get_mut(&server)
                    && let Some(chan) = table.get_mut(&channel)
                {
                    chan.remove_member(&origin);
                }
                let reason = message.trailing().unwrap_or_default().to_string();
                Some(Event::Part { server, origin, channel, reason })
            }
            "KICK" => {
                let channel = message.param(0).unwrap_or_default().to_string();
                let target = message.param(1).unwrap_or_default().to_string();
                if let Some(table) = self.channels.get_mut(&server)
                    && let Some(chan) = table.get_mut(&channel)
                {
                    chan.remove_member(&target);
                }
                let reason = message.trailing().unwrap_or_default().to_string();
                Some(Event::Kick { server, origin, channel, target, reason })
            }
            "QUIT" => {
                if let Some(table) = self.channels.get_mut(&server) {
                    table.remove_member_everywhere(&origin);
                }
                None
            }
            "NICK" => {
                let nickname = message.trailing().or_else(|| message.param(0)).unwrap_or_default().to_string();
                if let Some(table) = self.channels.get_mut(&server) {
                    table.rename_member_everywhere(&origin, &nickname);
                }
                Some(Event::Nick { server, origin, nickname })
            }
            "TOPIC" => {
                let channel = message.param(0).unwrap_or_default().to_string();
                let topic = message.trailing().unwrap_or_default().to_string();
                if let Some(table) = self.channels.get_mut(&server) {
                    table.entry(&channel).topic = Some(topic.clone());
                }
                Some(Event::Topic { server, origin, channel, topic })
            }
            "MODE" => {
                let target = message.param(0).unwrap_or_default().to_string();
                let mode = message.param(1).unwrap_or_default().to_string();
                let args: Vec<String> = message.params.iter().skip(2).cloned().collect();
                if target.starts_with(['#', '&'])
                    && let Some(table) = self.channels.get_mut(&server)
                {
                    table.entry(&target).apply_mode(&mode, &args);
                }
                Some(Event::Mode { server, origin, channel: target, mode, args })
            }
            "353" => {
                let channel = message.param(2).or_else(|| message.param(1)).unwrap_or_default().to_string();
                let names: Vec<String> =
                    message.trailing().unwrap_or_default().split_whitespace().map(String::from).collect();
                if let Some(table) = self.channels.get_mut(&server) {
                    let chan = table.entry(&channel);
                    for token in &names {
                        chan.add_names_token(token);
                    }
                }
                Some(Event::Names { server, channel, names })
            }
            "NOTICE" => {
                let message_text = message.trailing().unwrap_or_default().to_string();
                Some(Event::Notice { server, origin, message: message_text })
            }
            "PRIVMSG" => self.build_privmsg_event(server, origin, &message, &prefix),
            _ => None,
        };

        if let Some(event) = event {
            self.dispatch_event(event);
        }
    }

    /// Splits CTCP ACTION, plugin command triggers (`<prefix><plugin-id>
    /// <rest>`), and plain messages (spec.md §4.3 "onCommand").
    fn build_privmsg_event(&self, server: String, origin: String, message: &IrcMessage, prefix: &str) -> Option<Event> {
        let channel = message.param(0).unwrap_or_default().to_string();
        let text = message.trailing().unwrap_or_default();

        if let Some(action) = text.strip_prefix('\x01').and_then(|s| s.strip_suffix('\x01')).and_then(|s| s.strip_prefix("ACTION ")) {
            return Some(Event::Me { server, origin, channel, message: action.to_string() });
        }

        if let Some(rest) = text.strip_prefix(prefix)
            && let Some((candidate, tail)) = rest.split_once(' ').map(|(a, b)| (a, b.to_string())).or_else(|| {
                if rest.is_empty() { None } else { Some((rest, String::new())) }
            })
            && self.plugins.contains(candidate)
        {
            return Some(Event::Command { server, origin, channel, plugin: candidate.to_string(), message: tail });
        }

        Some(Event::Message { server, origin, channel, message: text.to_string() })
    }

    /// Dispatches to plugins through the rule engine, then fires hooks and
    /// pushes to every registered transport watcher (spec.md §4.1 pipeline:
    /// "server line -> Event -> rule engine per plugin -> plugin dispatch ->
    /// hook fire -> transport broadcast").
    fn dispatch_event(&mut self, event: Event) {
        let rules = self.rules.clone();
        let facade = self.facade.clone();

        if let Event::Command { plugin, .. } = &event {
            let target = plugin.clone();
            self.plugins.dispatch_all(&event, &facade, move |id| id != target);
        } else {
            let server = event.server().to_string();
            let channel = event.channel().map(str::to_string);
            let origin = event.origin().map(str::to_string);
            let handler_name = event.handler_name();

            self.plugins.dispatch_all(&event, &facade, move |plugin_id| {
                let dispatch = Dispatch {
                    server: &server,
                    channel: channel.as_deref(),
                    origin: origin.as_deref(),
                    plugin: plugin_id,
                    event: handler_name,
                };
                rules.evaluate(&dispatch) == Action::Drop
            });
        }

        self.hooks.fire(&event);
        self.watchers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn register_watcher(&mut self, sender: mpsc::UnboundedSender<Event>) {
        self.watchers.push(sender);
    }

    // -- plugin commands (spec.md §4.7 "plugin" group) ----------------------

    pub fn plugin_list(&self) -> Vec<&str> {
        self.plugins.ids().collect()
    }

    pub fn plugin_info(&self, id: &str) -> Result<&crate::plugin::PluginInfo, BotError> {
        self.plugins.get(id).map(|p| p.info()).ok_or_else(|| PluginError::NotFound(id.to_string()).into())
    }

    pub fn plugin_load(&mut self, id: &str) -> Result<(), BotError> {
        if self.plugins.contains(id) {
            return Err(PluginError::AlreadyExists(id.to_string()).into());
        }
        let plugin_config = self.plugin_configs.get(id).cloned().unwrap_or_else(|| PluginConfig {
            id: id.to_string(),
            ..Default::default()
        });
        let maps = PluginMaps {
            options: plugin_config.options.clone(),
            templates: plugin_config.templates.clone(),
            paths: plugin_config.paths.clone(),
        };
        let mut plugin = self.loaders.resolve(id, plugin_config.location.as_deref(), maps).map_err(BotError::from)?;
        plugin.on_load(&self.facade).map_err(BotError::from)?;
        self.plugins.insert(id.to_string(), plugin).map_err(BotError::from)?;
        self.plugin_configs.insert(id.to_string(), plugin_config);
        Ok(())
    }

    pub fn plugin_unload(&mut self, id: &str) -> Result<(), BotError> {
        let mut plugin = self.plugins.remove(id).map_err(BotError::from)?;
        plugin.on_unload(&self.facade);
        Ok(())
    }

    pub fn plugin_reload(&mut self, id: &str) -> Result<(), BotError> {
        let plugin = self.plugins.get_mut(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        plugin.on_reload(&self.facade).map_err(BotError::from)
    }

    pub fn plugin_config_get(&self, id: &str) -> Result<BTreeMap<String, String>, BotError> {
        let plugin = self.plugins.get(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        Ok(plugin.maps().options.clone())
    }

    pub fn plugin_config_set(&mut self, id: &str, key: &str, value: &str) -> Result<(), BotError> {
        let plugin = self.plugins.get_mut(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        plugin.maps_mut().options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn plugin_template_get(&self, id: &str) -> Result<BTreeMap<String, String>, BotError> {
        let plugin = self.plugins.get(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        Ok(plugin.maps().templates.clone())
    }

    pub fn plugin_template_set(&mut self, id: &str, key: &str, value: &str) -> Result<(), BotError> {
        let plugin = self.plugins.get_mut(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        plugin.maps_mut().templates.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn plugin_path_get(&self, id: &str) -> Result<BTreeMap<String, String>, BotError> {
        let plugin = self.plugins.get(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        Ok(plugin.maps().paths.clone())
    }

    pub fn plugin_path_set(&mut self, id: &str, key: &str, value: &str) -> Result<(), BotError> {
        let plugin = self.plugins.get_mut(id).ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        plugin.maps_mut().paths.insert(key.to_string(), value.to_string());
        Ok(())
    }

    // -- server commands (spec.md §4.7 "server" group) -----------------------

    pub fn server_list(&self) -> Vec<&str> {
        self.server_configs.keys().map(String::as_str).collect()
    }

    pub fn server_info(&self, id: &str) -> Result<(&ServerConfig, State), BotError> {
        let config = self.server_configs.get(id).ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        let state = self.states.get(id).copied().unwrap_or(State::Disconnected);
        Ok((config, state))
    }

    pub fn server_connect(&mut self, config: ServerConfig) -> Result<(), BotError> {
        if self.server_configs.contains_key(&config.id) {
            return Err(ServerError::AlreadyExists(config.id.clone()).into());
        }
        let handle = server::conn::spawn(config.clone(), self.inbound_tx.clone());
        self.servers.write().expect("server table poisoned").insert(config.id.clone(), handle);
        self.states.insert(config.id.clone(), State::Disconnected);
        self.channels.insert(config.id.clone(), ChannelTable::new());
        self.server_configs.insert(config.id.clone(), config);
        Ok(())
    }

    fn server_handle(&self, id: &str) -> Result<ServerHandle, BotError> {
        self.servers
            .read()
            .expect("server table poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()).into())
    }

    pub fn server_disconnect(&mut self, id: &str) -> Result<(), BotError> {
        let handle = self.server_handle(id)?;
        handle.disconnect();
        self.servers.write().expect("server table poisoned").remove(id);
        self.server_configs.remove(id);
        self.states.remove(id);
        self.channels.remove(id);
        Ok(())
    }

    pub fn server_reconnect(&mut self, id: &str) -> Result<(), BotError> {
        let config = self.server_configs.get(id).cloned().ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        if let Ok(handle) = self.server_handle(id) {
            handle.disconnect();
        }
        let handle = server::conn::spawn(config, self.inbound_tx.clone());
        self.servers.write().expect("server table poisoned").insert(id.to_string(), handle);
        Ok(())
    }

    pub fn server_send(&self, id: &str, raw: &str) -> Result<(), BotError> {
        self.facade.send(id, raw).map_err(BotError::from)
    }

    pub fn facade(&self) -> &BotFacade {
        &self.facade
    }

    // -- rule commands (spec.md §4.7 "rule" group) ----------------------------

    pub fn rule_list(&self) -> &[crate::rule::Rule] {
        self.rules.list()
    }

    pub fn rule_add(&mut self, rule: crate::rule::Rule, index: Option<usize>) {
        self.rules.add(rule, index);
    }

    pub fn rule_edit(&mut self, index: usize, patch: crate::rule::RulePatch) -> Result<(), BotError> {
        self.rules.edit(index, patch).map_err(BotError::from)
    }

    pub fn rule_move(&mut self, from: usize, to: usize) -> Result<(), BotError> {
        self.rules.move_rule(from, to).map_err(BotError::from)
    }

    pub fn rule_remove(&mut self, index: usize) -> Result<(), BotError> {
        self.rules.remove(index).map_err(BotError::from)
    }

    // -- hook commands (spec.md §4.7 "hook" group) ----------------------------

    pub fn hook_list(&self) -> Vec<(&str, &std::path::Path)> {
        self.hooks.list().map(|(id, path)| (id, path.as_path())).collect()
    }

    pub fn hook_add(&mut self, id: &str, path: PathBuf) {
        self.hooks.add(id, path);
    }

    pub fn hook_remove(&mut self, id: &str) -> Result<(), BotError> {
        self.hooks.remove(id).map_err(BotError::from)
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Replaces rules and hooks from a freshly re-read config file
    /// (`bin/irccd.rs`'s hot-reload watcher). Servers and loaded plugins are
    /// left untouched: re-dialing servers or re-evaluating plugin scripts on
    /// every config edit would tear down live connections and JS state for a
    /// change that's usually just a rule tweak, so that is out of scope here
    /// (see DESIGN.md).
    pub fn reload_rules_and_hooks(&mut self, config: &Config) {
        let mut rules = crate::rule::RuleList::new();
        for rule in &config.rules {
            rules.add(rule.clone(), None);
        }
        self.rules = rules;

        let mut hooks = HookTable::new();
        for hook in &config.hooks {
            hooks.add(hook.id.clone(), hook.path.clone());
        }
        self.hooks = hooks;
    }
}

/// Builds the `{"command":...}` success envelope shared by every handler
/// (spec.md §4.6 "every response echoes `command`").
pub fn ok_envelope(command: &str) -> Value {
    json!({ "command": command })
}
