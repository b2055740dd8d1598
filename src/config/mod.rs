//! Extended-INI configuration (spec.md §6): `[logs]`, `[general]`,
//! `[transport]`, `[server.<id>]`, `[plugin.<id>]`, `[rule]`, `[hook.<id>]`,
//! with `@include`/`@tryinclude` and `( "a", "b" )` list literals.

mod document;
mod token;

pub use document::{ParseError as DocumentParseError, Section};
pub use token::LexError;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::rule::{Action, Rule};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Parse(String),
    #[error("section [{section}]: missing required key '{key}'")]
    MissingKey { section: String, key: String },
    #[error("section [{section}]: invalid value for '{key}': {value}")]
    InvalidValue { section: String, key: String, value: String },
}

impl From<document::ParseError> for ConfigError {
    fn from(e: document::ParseError) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogsConfig {
    pub verbose: bool,
    pub sink: LogSink,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogSink {
    #[default]
    Console,
    File(PathBuf),
    Syslog,
}

#[derive(Debug, Clone, Default)]
pub struct GeneralConfig {
    pub plugin_paths: Vec<PathBuf>,
    pub pidfile: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    pub bind: TransportBind,
    pub password: Option<String>,
    pub tls: Option<TlsMaterial>,
}

#[derive(Debug, Clone)]
pub enum TransportBind {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub endpoints: Vec<TransportEndpoint>,
}

#[derive(Debug, Clone)]
pub struct ServerChannel {
    pub name: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub id: String,
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    pub tls_verify: bool,
    pub password: Option<String>,
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub channels: Vec<ServerChannel>,
    pub reconnect_tries: i32,
    pub reconnect_delay: u64,
    pub flood_delay_ms: u64,
    pub prefix: String,
    pub ctcp_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            id: String::new(),
            hostname: String::new(),
            port: 6667,
            tls: false,
            tls_verify: true,
            password: None,
            nickname: "irccd".into(),
            username: "irccd".into(),
            realname: "irccd".into(),
            channels: Vec::new(),
            reconnect_tries: -1,
            reconnect_delay: 30,
            flood_delay_ms: 500,
            prefix: "!".into(),
            ctcp_version: "IRC Client Daemon".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    pub id: String,
    pub location: Option<PathBuf>,
    pub options: BTreeMap<String, String>,
    pub templates: BTreeMap<String, String>,
    pub paths: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct HookConfig {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logs: LogsConfig,
    pub general: GeneralConfig,
    pub transport: TransportConfig,
    pub servers: Vec<ServerConfig>,
    pub plugins: Vec<PluginConfig>,
    pub rules: Vec<Rule>,
    pub hooks: Vec<HookConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let doc = document::read_file(path)?;
        Config::from_document(&doc)
    }

    pub fn from_str(source: &str) -> Result<Config, ConfigError> {
        let doc = document::read_string(source)?;
        Config::from_document(&doc)
    }

    fn from_document(doc: &document::Document) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        for section in &doc.sections {
            match section.name.as_str() {
                "logs" => config.logs = parse_logs(section)?,
                "general" => config.general = parse_general(section),
                "transport" => config.transport.endpoints.push(parse_transport(section)?),
                name if name.starts_with("server.") => {
                    config.servers.push(parse_server(name.trim_start_matches("server.").to_string(), section)?);
                }
                name if name.starts_with("plugin.") => {
                    config.plugins.push(parse_plugin(name.trim_start_matches("plugin.").to_string(), section));
                }
                name if name.starts_with("hook.") => {
                    config.hooks.push(parse_hook(name.trim_start_matches("hook.").to_string(), section)?);
                }
                "rule" => config.rules.push(parse_rule(section)?),
                other => {
                    tracing::warn!(section = other, "ignoring unrecognized configuration section");
                }
            }
        }

        Ok(config)
    }
}

fn parse_logs(section: &Section) -> Result<LogsConfig, ConfigError> {
    let verbose = section.get("verbose").map(|v| v == "true").unwrap_or(false);
    let sink = match section.get("type") {
        None | Some("console") => LogSink::Console,
        Some("file") => {
            let path = section.get("path").ok_or_else(|| ConfigError::MissingKey {
                section: "logs".into(),
                key: "path".into(),
            })?;
            LogSink::File(PathBuf::from(path))
        }
        Some("syslog") => LogSink::Syslog,
        Some(other) => {
            return Err(ConfigError::InvalidValue { section: "logs".into(), key: "type".into(), value: other.into() });
        }
    };
    Ok(LogsConfig { verbose, sink })
}

fn parse_general(section: &Section) -> GeneralConfig {
    GeneralConfig {
        plugin_paths: section.get_all("plugin_path").into_iter().map(PathBuf::from).collect(),
        pidfile: section.get("pidfile").map(PathBuf::from),
    }
}

fn parse_transport(section: &Section) -> Result<TransportEndpoint, ConfigError> {
    let bind = match section.get("type") {
        Some("unix") => {
            let path = section.get("path").ok_or_else(|| ConfigError::MissingKey {
                section: "transport".into(),
                key: "path".into(),
            })?;
            TransportBind::Unix(PathBuf::from(path))
        }
        Some("ip") | Some("tcp") | None => {
            let host = section.get("host").unwrap_or("localhost").to_string();
            let port = section
                .get("port")
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| ConfigError::MissingKey { section: "transport".into(), key: "port".into() })?;
            TransportBind::Tcp { host, port }
        }
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                section: "transport".into(),
                key: "type".into(),
                value: other.into(),
            });
        }
    };

    let tls = match (section.get("certificate"), section.get("privatekey")) {
        (Some(cert), Some(key)) => Some(TlsMaterial { cert: PathBuf::from(cert), key: PathBuf::from(key) }),
        _ => None,
    };

    Ok(TransportEndpoint { bind, password: section.get("password").map(String::from), tls })
}

fn parse_server(id: String, section: &Section) -> Result<ServerConfig, ConfigError> {
    let hostname = section
        .get("host")
        .ok_or_else(|| ConfigError::MissingKey { section: format!("server.{id}"), key: "host".into() })?
        .to_string();

    let mut server = ServerConfig { id, hostname, ..Default::default() };

    if let Some(port) = section.get("port") {
        server.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidValue { section: "server".into(), key: "port".into(), value: port.into() })?;
    }
    server.tls = section.get("ssl").map(|v| v == "true").unwrap_or(false);
    server.tls_verify = section.get("ssl_verify").map(|v| v == "true").unwrap_or(true);
    server.password = section.get("password").map(String::from);

    if let Some(nickname) = section.get("nickname") {
        server.nickname = nickname.to_string();
    }
    if let Some(username) = section.get("username") {
        server.username = username.to_string();
    }
    if let Some(realname) = section.get("realname") {
        server.realname = realname.to_string();
    }
    if let Some(prefix) = section.get("command_char") {
        server.prefix = prefix.to_string();
    }
    if let Some(ctcp) = section.get("ctcp_version") {
        server.ctcp_version = ctcp.to_string();
    }

    server.channels = section
        .get_all("channels")
        .into_iter()
        .map(|entry| match entry.split_once(':') {
            Some((name, key)) => ServerChannel { name: name.to_string(), key: Some(key.to_string()) },
            None => ServerChannel { name: entry.to_string(), key: None },
        })
        .collect();

    if let Some(tries) = section.get("reconnect_tries") {
        server.reconnect_tries = tries.parse().map_err(|_| ConfigError::InvalidValue {
            section: "server".into(),
            key: "reconnect_tries".into(),
            value: tries.into(),
        })?;
    }
    if let Some(delay) = section.get("reconnect_delay") {
        server.reconnect_delay = delay.parse().map_err(|_| ConfigError::InvalidValue {
            section: "server".into(),
            key: "reconnect_delay".into(),
            value: delay.into(),
        })?;
    }
    if let Some(delay) = section.get("flood_delay_ms") {
        server.flood_delay_ms = delay.parse().unwrap_or(server.flood_delay_ms);
    }

    Ok(server)
}

fn parse_plugin(id: String, section: &Section) -> PluginConfig {
    let mut plugin = PluginConfig { id, ..Default::default() };
    plugin.location = section.get("location").map(PathBuf::from);

    for option in &section.options {
        if let Some(key) = option.key.strip_prefix("config.") {
            plugin.options.insert(key.to_string(), option.values.first().cloned().unwrap_or_default());
        } else if let Some(key) = option.key.strip_prefix("template.") {
            plugin.templates.insert(key.to_string(), option.values.first().cloned().unwrap_or_default());
        } else if let Some(key) = option.key.strip_prefix("path.") {
            plugin.paths.insert(key.to_string(), option.values.first().cloned().unwrap_or_default());
        }
    }

    plugin
}

fn parse_hook(id: String, section: &Section) -> Result<HookConfig, ConfigError> {
    let path = section
        .get("path")
        .ok_or_else(|| ConfigError::MissingKey { section: format!("hook.{id}"), key: "path".into() })?;
    Ok(HookConfig { id, path: PathBuf::from(path) })
}

fn parse_rule(section: &Section) -> Result<Rule, ConfigError> {
    let action = match section.get("action") {
        Some("accept") | None => Action::Accept,
        Some("drop") => Action::Drop,
        Some(other) => {
            return Err(ConfigError::InvalidValue { section: "rule".into(), key: "action".into(), value: other.into() });
        }
    };

    Ok(Rule {
        servers: section.get_all("servers").into_iter().map(String::from).collect(),
        channels: section.get_all("channels").into_iter().map(String::from).collect(),
        origins: section.get_all("origins").into_iter().map(String::from).collect(),
        plugins: section.get_all("plugins").into_iter().map(String::from).collect(),
        events: section.get_all("events").into_iter().map(String::from).collect(),
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_full_config() {
        let source = r#"
[general]
plugin_path = /opt/irccd/plugins

[transport]
type = unix
path = /tmp/irccd.sock

[server.libera]
host = irc.libera.chat
port = 6697
ssl = true
nickname = mybot
channels = ( "#irccd", "#general:secretkey" )

[plugin.logger]
location = /opt/irccd/plugins/logger.js
config.format = simple

[rule]
servers = libera
action = drop

[hook.notify]
path = /usr/local/bin/notify-hook
"#;
        let config = Config::from_str(source).unwrap();

        assert_eq!(config.general.plugin_paths, vec![PathBuf::from("/opt/irccd/plugins")]);
        assert!(matches!(config.transport.endpoints[0].bind, TransportBind::Unix(_)));

        let server = &config.servers[0];
        assert_eq!(server.id, "libera");
        assert_eq!(server.port, 6697);
        assert!(server.tls);
        assert_eq!(server.channels.len(), 2);
        assert_eq!(server.channels[1].key.as_deref(), Some("secretkey"));

        assert_eq!(config.plugins[0].id, "logger");
        assert_eq!(config.plugins[0].options.get("format").map(String::as_str), Some("simple"));

        assert_eq!(config.rules[0].action, Action::Drop);
        assert_eq!(config.hooks[0].id, "notify");
    }

    #[test]
    fn missing_required_key_errors() {
        let err = Config::from_str("[server.x]\nport = 6667\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }
}
