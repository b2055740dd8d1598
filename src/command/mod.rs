//! Command registry (spec.md §4.7/§6): every request a transport client can
//! send, grouped by subsystem. Each handler validates its JSON body, calls
//! into [`Bot`], and returns the JSON envelope written back to the client.
//!
//! Grounded on the teacher's `commands/` dispatch-by-name pattern
//! (`examples/plsuwu-pea-fan/src/commands/mod.rs`), generalized from "a fixed
//! table of chat commands" to "a fixed table of control-transport commands",
//! kept in a `OnceLock` instead of being built on every call.

use std::path::PathBuf;
use std::sync::OnceLock;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use crate::bot::{Bot, ok_envelope};
use crate::config::ServerConfig;
use crate::error::{BotError, BotResult, IrccdError, RuleError};
use crate::event::Event;
use crate::rule::{Action, Rule, RulePatch};

type Handler = fn(&mut Bot, &Value, &mpsc::UnboundedSender<Event>) -> BotResult<Value>;

fn invalid() -> BotError {
    IrccdError::InvalidMessage.into()
}

fn field_str<'a>(body: &'a Value, key: &str) -> BotResult<&'a str> {
    body.get(key).and_then(Value::as_str).ok_or_else(invalid)
}

fn field_str_opt<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn field_u64(body: &Value, key: &str) -> BotResult<u64> {
    body.get(key).and_then(Value::as_u64).ok_or_else(invalid)
}

fn field_index(body: &Value, key: &str) -> BotResult<usize> {
    body.get(key).and_then(Value::as_u64).map(|v| v as usize).ok_or_else(invalid)
}

fn field_array_str(body: &Value, key: &str) -> Vec<String> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Builds the `{"command": ..., ...extra}` response envelope.
fn envelope(command: &str, extra: Map<String, Value>) -> Value {
    let mut map = extra;
    map.insert("command".to_string(), Value::String(command.to_string()));
    Value::Object(map)
}

fn map_of(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Looks up and invokes the handler for `command`. Unknown names yield
/// `InvalidCommand` (spec.md §6 lifecycle: after auth, every command maps to
/// exactly one registered handler or is rejected).
pub fn dispatch(bot: &mut Bot, command: &str, body: &Value, watch_sender: mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let registry = registry();
    match registry.get(command) {
        Some(handler) => handler(bot, body, &watch_sender),
        None => Err(IrccdError::InvalidCommand.into()),
    }
}

fn registry() -> &'static std::collections::BTreeMap<&'static str, Handler> {
    static REGISTRY: OnceLock<std::collections::BTreeMap<&'static str, Handler>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

fn build_registry() -> std::collections::BTreeMap<&'static str, Handler> {
    let mut m: std::collections::BTreeMap<&'static str, Handler> = std::collections::BTreeMap::new();

    m.insert("plugin-list", plugin_list);
    m.insert("plugin-load", plugin_load);
    m.insert("plugin-unload", plugin_unload);
    m.insert("plugin-reload", plugin_reload);
    m.insert("plugin-info", plugin_info);
    m.insert("plugin-config", plugin_config);
    m.insert("plugin-template", plugin_template);
    m.insert("plugin-path", plugin_path);

    m.insert("server-list", server_list);
    m.insert("server-info", server_info);
    m.insert("server-connect", server_connect);
    m.insert("server-disconnect", server_disconnect);
    m.insert("server-reconnect", server_reconnect);
    m.insert("server-join", server_join);
    m.insert("server-part", server_part);
    m.insert("server-message", server_message);
    m.insert("server-notice", server_notice);
    m.insert("server-me", server_me);
    m.insert("server-mode", server_mode);
    m.insert("server-invite", server_invite);
    m.insert("server-kick", server_kick);
    m.insert("server-nick", server_nick);
    m.insert("server-topic", server_topic);

    m.insert("rule-list", rule_list);
    m.insert("rule-add", rule_add);
    m.insert("rule-edit", rule_edit);
    m.insert("rule-move", rule_move);
    m.insert("rule-remove", rule_remove);

    m.insert("hook-list", hook_list);
    m.insert("hook-add", hook_add);
    m.insert("hook-remove", hook_remove);

    m.insert("auth", auth);
    m.insert("watch", watch);

    m
}

// -- plugin group ------------------------------------------------------------

fn plugin_list(bot: &mut Bot, _body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let list: Vec<Value> = bot.plugin_list().into_iter().map(|id| Value::String(id.to_string())).collect()
        ;
    Ok(envelope("plugin-list", map_of([("list", Value::Array(list))])))
}

fn plugin_load(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    bot.plugin_load(id)?;
    Ok(ok_envelope("plugin-load"))
}

fn plugin_unload(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    bot.plugin_unload(id)?;
    Ok(ok_envelope("plugin-unload"))
}

fn plugin_reload(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    bot.plugin_reload(id)?;
    Ok(ok_envelope("plugin-reload"))
}

fn plugin_info(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    let info = bot.plugin_info(id)?;
    Ok(envelope(
        "plugin-info",
        map_of([
            ("author", Value::String(info.author.clone())),
            ("license", Value::String(info.license.clone())),
            ("summary", Value::String(info.summary.clone())),
            ("version", Value::String(info.version.clone())),
        ]),
    ))
}

fn plugin_config(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    match (field_str_opt(body, "variable"), field_str_opt(body, "value")) {
        (Some(key), Some(value)) => {
            bot.plugin_config_set(id, key, value)?;
            Ok(ok_envelope("plugin-config"))
        }
        _ => {
            let values = bot.plugin_config_get(id)?;
            let obj: Map<String, Value> = values.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            Ok(envelope("plugin-config", map_of([("variables", Value::Object(obj))])))
        }
    }
}

fn plugin_template(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    match (field_str_opt(body, "variable"), field_str_opt(body, "value")) {
        (Some(key), Some(value)) => {
            bot.plugin_template_set(id, key, value)?;
            Ok(ok_envelope("plugin-template"))
        }
        _ => {
            let values = bot.plugin_template_get(id)?;
            let obj: Map<String, Value> = values.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            Ok(envelope("plugin-template", map_of([("variables", Value::Object(obj))])))
        }
    }
}

fn plugin_path(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "plugin")?;
    match (field_str_opt(body, "variable"), field_str_opt(body, "value")) {
        (Some(key), Some(value)) => {
            bot.plugin_path_set(id, key, value)?;
            Ok(ok_envelope("plugin-path"))
        }
        _ => {
            let values = bot.plugin_path_get(id)?;
            let obj: Map<String, Value> = values.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            Ok(envelope("plugin-path", map_of([("variables", Value::Object(obj))])))
        }
    }
}

// -- server group -------------------------------------------------------------

fn server_list(bot: &mut Bot, _body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let list: Vec<Value> = bot.server_list().into_iter().map(|id| Value::String(id.to_string())).collect();
    Ok(envelope("server-list", map_of([("list", Value::Array(list))])))
}

fn server_info(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "server")?;
    let (config, state) = bot.server_info(id)?;
    Ok(envelope(
        "server-info",
        map_of([
            ("name", Value::String(config.id.clone())),
            ("hostname", Value::String(config.hostname.clone())),
            ("port", Value::from(config.port)),
            ("ssl", Value::Bool(config.tls)),
            ("nickname", Value::String(config.nickname.clone())),
            ("status", Value::String(state.to_string())),
            (
                "channels",
                Value::Array(config.channels.iter().map(|c| Value::String(c.name.clone())).collect()),
            ),
        ]),
    ))
}

fn server_connect(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "server")?.to_string();
    let hostname = field_str(body, "hostname")?.to_string();

    let mut config = ServerConfig { id, hostname, ..Default::default() };
    if let Some(port) = body.get("port").and_then(Value::as_u64) {
        config.port = port as u16;
    }
    config.tls = body.get("ssl").and_then(Value::as_bool).unwrap_or(false);
    config.tls_verify = body.get("sslVerify").and_then(Value::as_bool).unwrap_or(true);
    config.password = field_str_opt(body, "password").map(String::from);
    if let Some(nickname) = field_str_opt(body, "nickname") {
        config.nickname = nickname.to_string();
    }
    if let Some(username) = field_str_opt(body, "username") {
        config.username = username.to_string();
    }
    if let Some(realname) = field_str_opt(body, "realname") {
        config.realname = realname.to_string();
    }

    bot.server_connect(config)?;
    Ok(ok_envelope("server-connect"))
}

fn server_disconnect(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "server")?;
    bot.server_disconnect(id)?;
    Ok(ok_envelope("server-disconnect"))
}

fn server_reconnect(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "server")?;
    bot.server_reconnect(id)?;
    Ok(ok_envelope("server-reconnect"))
}

fn server_join(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let channel = field_str(body, "channel")?;
    let line = match field_str_opt(body, "password") {
        Some(key) => format!("JOIN {channel} {key}"),
        None => format!("JOIN {channel}"),
    };
    bot.server_send(server, &line)?;
    Ok(ok_envelope("server-join"))
}

fn server_part(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let channel = field_str(body, "channel")?;
    let line = match field_str_opt(body, "reason") {
        Some(reason) => format!("PART {channel} :{reason}"),
        None => format!("PART {channel}"),
    };
    bot.server_send(server, &line)?;
    Ok(ok_envelope("server-part"))
}

fn server_message(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let target = field_str(body, "target")?;
    let message = field_str(body, "message")?;
    bot.server_send(server, &format!("PRIVMSG {target} :{message}"))?;
    Ok(ok_envelope("server-message"))
}

fn server_notice(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let target = field_str(body, "target")?;
    let message = field_str(body, "message")?;
    bot.server_send(server, &format!("NOTICE {target} :{message}"))?;
    Ok(ok_envelope("server-notice"))
}

fn server_me(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let target = field_str(body, "target")?;
    let message = field_str(body, "message")?;
    bot.server_send(server, &format!("PRIVMSG {target} :\x01ACTION {message}\x01"))?;
    Ok(ok_envelope("server-me"))
}

fn server_mode(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let channel = field_str(body, "channel")?;
    let mode = field_str(body, "mode")?;
    let args = field_array_str(body, "arguments").join(" ");
    let line = if args.is_empty() { format!("MODE {channel} {mode}") } else { format!("MODE {channel} {mode} {args}") };
    bot.server_send(server, &line)?;
    Ok(ok_envelope("server-mode"))
}

fn server_invite(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let target = field_str(body, "target")?;
    let channel = field_str(body, "channel")?;
    bot.server_send(server, &format!("INVITE {target} {channel}"))?;
    Ok(ok_envelope("server-invite"))
}

fn server_kick(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let target = field_str(body, "target")?;
    let channel = field_str(body, "channel")?;
    let line = match field_str_opt(body, "reason") {
        Some(reason) => format!("KICK {channel} {target} :{reason}"),
        None => format!("KICK {channel} {target}"),
    };
    bot.server_send(server, &line)?;
    Ok(ok_envelope("server-kick"))
}

fn server_nick(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let nickname = field_str(body, "nickname")?;
    bot.server_send(server, &format!("NICK {nickname}"))?;
    Ok(ok_envelope("server-nick"))
}

fn server_topic(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let server = field_str(body, "server")?;
    let channel = field_str(body, "channel")?;
    let topic = field_str(body, "topic")?;
    bot.server_send(server, &format!("TOPIC {channel} :{topic}"))?;
    Ok(ok_envelope("server-topic"))
}

// -- rule group ----------------------------------------------------------------

fn parse_set(body: &Value, key: &str) -> std::collections::BTreeSet<String> {
    field_array_str(body, key).into_iter().collect()
}

fn parse_action(body: &Value, key: &str) -> BotResult<Action> {
    match body.get(key).and_then(Value::as_str) {
        Some("accept") | None => Ok(Action::Accept),
        Some("drop") => Ok(Action::Drop),
        Some(_) => Err(RuleError::InvalidAction.into()),
    }
}

fn rule_list(bot: &mut Bot, _body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let rules: Vec<Value> = bot.rule_list().iter().map(|r| serde_json::to_value(r).unwrap_or(Value::Null)).collect();
    Ok(envelope("rule-list", map_of([("list", Value::Array(rules))])))
}

fn rule_add(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let rule = Rule {
        servers: parse_set(body, "servers"),
        channels: parse_set(body, "channels"),
        origins: parse_set(body, "origins"),
        plugins: parse_set(body, "plugins"),
        events: parse_set(body, "events"),
        action: parse_action(body, "action")?,
    };
    let index = body.get("index").and_then(Value::as_u64).map(|v| v as usize);
    bot.rule_add(rule, index);
    Ok(ok_envelope("rule-add"))
}

fn rule_edit(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let index = field_index(body, "index")?;
    let patch = RulePatch {
        add_servers: parse_set(body, "add-servers"),
        remove_servers: parse_set(body, "remove-servers"),
        add_channels: parse_set(body, "add-channels"),
        remove_channels: parse_set(body, "remove-channels"),
        add_origins: parse_set(body, "add-origins"),
        remove_origins: parse_set(body, "remove-origins"),
        add_plugins: parse_set(body, "add-plugins"),
        remove_plugins: parse_set(body, "remove-plugins"),
        add_events: parse_set(body, "add-events"),
        remove_events: parse_set(body, "remove-events"),
        action: body.get("action").and_then(Value::as_str).map(|v| if v == "drop" { Action::Drop } else { Action::Accept }),
    };
    bot.rule_edit(index, patch)?;
    Ok(ok_envelope("rule-edit"))
}

fn rule_move(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let from = field_index(body, "from")?;
    let to = field_index(body, "to")?;
    bot.rule_move(from, to)?;
    Ok(ok_envelope("rule-move"))
}

fn rule_remove(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let index = field_index(body, "index")?;
    bot.rule_remove(index)?;
    Ok(ok_envelope("rule-remove"))
}

// -- hook group ------------------------------------------------------------------

fn hook_list(bot: &mut Bot, _body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let list: Vec<Value> = bot
        .hook_list()
        .into_iter()
        .map(|(id, path)| json!({ "id": id, "path": path.to_string_lossy() }))
        .collect();
    Ok(envelope("hook-list", map_of([("list", Value::Array(list))])))
}

fn hook_add(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "id")?;
    let path = PathBuf::from(field_str(body, "path")?);
    bot.hook_add(id, path);
    Ok(ok_envelope("hook-add"))
}

fn hook_remove(bot: &mut Bot, body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    let id = field_str(body, "id")?;
    bot.hook_remove(id)?;
    Ok(ok_envelope("hook-remove"))
}

// -- control group ------------------------------------------------------------------

/// Structural placeholder only: password authentication happens in
/// `transport::client` before a command ever reaches this registry, since the
/// endpoint password isn't part of `Bot`'s dynamic state. A client that
/// somehow reaches this handler is already authenticated.
fn auth(_bot: &mut Bot, _body: &Value, _watch: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    Ok(ok_envelope("auth"))
}

fn watch(bot: &mut Bot, _body: &Value, watch_sender: &mpsc::UnboundedSender<Event>) -> BotResult<Value> {
    bot.register_watcher(watch_sender.clone());
    Ok(ok_envelope("watch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_is_invalid() {
        let registry = build_registry();
        assert!(!registry.contains_key("not-a-real-command"));
    }

    #[test]
    fn registry_covers_every_documented_command() {
        let registry = build_registry();
        for name in [
            "plugin-list", "plugin-load", "plugin-unload", "plugin-reload", "plugin-info", "plugin-config",
            "plugin-template", "plugin-path", "server-list", "server-info", "server-connect", "server-disconnect",
            "server-reconnect", "server-join", "server-part", "server-message", "server-notice", "server-me",
            "server-mode", "server-invite", "server-kick", "server-nick", "server-topic", "rule-list", "rule-add",
            "rule-edit", "rule-move", "rule-remove", "hook-list", "hook-add", "hook-remove", "auth", "watch",
        ] {
            assert!(registry.contains_key(name), "missing handler for {name}");
        }
    }
}
