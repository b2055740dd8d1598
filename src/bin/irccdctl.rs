//! Control client CLI (spec.md §6 "CLI surface"): one subcommand per
//! transport command, positional arguments, global `-c`/`-s`/`-v` flags.
//!
//! Grounded on the teacher's `clap::Parser` pattern (`src/args.rs`) and the
//! subcommand/flag/exit-code shape of
//! `examples/original_source/irccdctl/irccdctl.c` (`commands[]` dispatch
//! table), ported to Rust idiom: the original's plaintext newline protocol
//! is not carried forward, only its CLI surface is (see DESIGN.md).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use irccd::config::{Config, TransportBind};
use irccd::ctl::{CtlError, Endpoint, Session};
use serde_json::{Map, Value, json};

const DEFAULT_SOCKET: &str = "/tmp/irccd.sock";

#[derive(Parser, Debug)]
#[command(name = "irccdctl", about = "Control client for a running irccd instance")]
struct Cli {
    /// Configuration file to read the transport endpoint from.
    #[arg(short = 'c', long = "config", value_name = "path")]
    config: Option<PathBuf>,

    /// Unix socket path to connect to, overriding the default and any config.
    #[arg(short = 's', long = "sock", value_name = "path")]
    sock: Option<PathBuf>,

    /// Emit debug-level diagnostics about the connection itself.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Password for transport authentication.
    #[arg(short = 'p', long = "password")]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    PluginList,
    PluginLoad { plugin: String },
    PluginUnload { plugin: Option<String> },
    PluginReload { plugin: Option<String> },
    PluginInfo { plugin: String },
    PluginConfig { plugin: String, variable: Option<String>, value: Option<String> },
    PluginTemplate { plugin: String, variable: Option<String>, value: Option<String> },
    PluginPath { plugin: String, variable: Option<String>, value: Option<String> },

    ServerList,
    ServerInfo { server: String },
    ServerConnect {
        server: String,
        hostname: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        ssl: bool,
        #[arg(long = "no-verify")]
        no_verify: bool,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        realname: Option<String>,
    },
    ServerDisconnect { server: Option<String> },
    ServerReconnect { server: Option<String> },
    ServerJoin { server: String, channel: String, key: Option<String> },
    ServerPart { server: String, channel: String, reason: Option<String> },
    ServerMessage { server: String, target: String, message: String },
    ServerNotice { server: String, target: String, message: String },
    ServerMe { server: String, target: String, message: String },
    ServerMode { server: String, channel: String, mode: String, arguments: Vec<String> },
    ServerInvite { server: String, target: String, channel: String },
    ServerKick { server: String, target: String, channel: String, reason: Option<String> },
    ServerNick { server: String, nickname: String },
    ServerTopic { server: String, channel: String, topic: String },

    RuleList,
    RuleAdd {
        #[arg(long = "server", action = clap::ArgAction::Append)]
        servers: Vec<String>,
        #[arg(long = "channel", action = clap::ArgAction::Append)]
        channels: Vec<String>,
        #[arg(long = "origin", action = clap::ArgAction::Append)]
        origins: Vec<String>,
        #[arg(long = "plugin", action = clap::ArgAction::Append)]
        plugins: Vec<String>,
        #[arg(long = "event", action = clap::ArgAction::Append)]
        events: Vec<String>,
        #[arg(long, default_value = "accept")]
        action: String,
        #[arg(long)]
        index: Option<usize>,
    },
    RuleEdit {
        index: usize,
        #[arg(long = "add-server", action = clap::ArgAction::Append)]
        add_servers: Vec<String>,
        #[arg(long = "remove-server", action = clap::ArgAction::Append)]
        remove_servers: Vec<String>,
        #[arg(long = "add-channel", action = clap::ArgAction::Append)]
        add_channels: Vec<String>,
        #[arg(long = "remove-channel", action = clap::ArgAction::Append)]
        remove_channels: Vec<String>,
        #[arg(long = "add-origin", action = clap::ArgAction::Append)]
        add_origins: Vec<String>,
        #[arg(long = "remove-origin", action = clap::ArgAction::Append)]
        remove_origins: Vec<String>,
        #[arg(long = "add-plugin", action = clap::ArgAction::Append)]
        add_plugins: Vec<String>,
        #[arg(long = "remove-plugin", action = clap::ArgAction::Append)]
        remove_plugins: Vec<String>,
        #[arg(long = "add-event", action = clap::ArgAction::Append)]
        add_events: Vec<String>,
        #[arg(long = "remove-event", action = clap::ArgAction::Append)]
        remove_events: Vec<String>,
        #[arg(long)]
        action: Option<String>,
    },
    RuleMove { from: usize, to: usize },
    RuleRemove { index: usize },

    HookList,
    HookAdd { id: String, path: PathBuf },
    HookRemove { id: String },

    /// Streams events until interrupted (spec.md §6 `watch`).
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let endpoint = resolve_endpoint(&cli)?;
    let mut session = Session::connect(&endpoint, cli.password.as_deref()).await.context("connecting to irccd")?;

    if let Command::Watch = cli.command {
        loop {
            match session.next_event().await {
                Ok(event) => println!("{event}"),
                Err(CtlError::Closed) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    let (name, body) = request_for(cli.command);
    let response = session.call(name, body).await.with_context(|| format!("running {name}"))?;
    print_response(&response);
    Ok(())
}

/// `-s` wins outright; otherwise `-c` is read for its first transport
/// endpoint; otherwise the POSIX default (spec.md §6).
fn resolve_endpoint(cli: &Cli) -> anyhow::Result<Endpoint> {
    if let Some(sock) = &cli.sock {
        return Ok(Endpoint::Unix(sock.clone()));
    }

    if let Some(path) = &cli.config {
        let config = Config::load(path).with_context(|| format!("loading {}", path.display()))?;
        let endpoint =
            config.transport.endpoints.first().ok_or_else(|| anyhow!("configuration defines no transport endpoint"))?;
        return Ok(match &endpoint.bind {
            TransportBind::Unix(path) => Endpoint::Unix(path.clone()),
            TransportBind::Tcp { host, port } => {
                Endpoint::Tcp { host: host.clone(), port: *port, tls: endpoint.tls.is_some() }
            }
        });
    }

    Ok(Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET)))
}

fn obj(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn opt_str(field: &'static str, value: Option<String>) -> Option<(&'static str, Value)> {
    value.map(|v| (field, Value::String(v)))
}

/// Maps one parsed subcommand onto `(command name, JSON body)`, matching
/// field names one-to-one with `command::dispatch`'s handlers.
fn request_for(command: Command) -> (&'static str, Map<String, Value>) {
    match command {
        Command::PluginList => ("plugin-list", Map::new()),
        Command::PluginLoad { plugin } => ("plugin-load", obj([("plugin", json!(plugin))])),
        Command::PluginUnload { plugin } => {
            ("plugin-unload", plugin.map(|p| obj([("plugin", json!(p))])).unwrap_or_default())
        }
        Command::PluginReload { plugin } => {
            ("plugin-reload", plugin.map(|p| obj([("plugin", json!(p))])).unwrap_or_default())
        }
        Command::PluginInfo { plugin } => ("plugin-info", obj([("plugin", json!(plugin))])),
        Command::PluginConfig { plugin, variable, value } => {
            let mut body = obj([("plugin", json!(plugin))]);
            if let Some(pair) = opt_str("variable", variable) {
                body.insert(pair.0.to_string(), pair.1);
            }
            if let Some(pair) = opt_str("value", value) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("plugin-config", body)
        }
        Command::PluginTemplate { plugin, variable, value } => {
            let mut body = obj([("plugin", json!(plugin))]);
            if let Some(pair) = opt_str("variable", variable) {
                body.insert(pair.0.to_string(), pair.1);
            }
            if let Some(pair) = opt_str("value", value) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("plugin-template", body)
        }
        Command::PluginPath { plugin, variable, value } => {
            let mut body = obj([("plugin", json!(plugin))]);
            if let Some(pair) = opt_str("variable", variable) {
                body.insert(pair.0.to_string(), pair.1);
            }
            if let Some(pair) = opt_str("value", value) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("plugin-path", body)
        }

        Command::ServerList => ("server-list", Map::new()),
        Command::ServerInfo { server } => ("server-info", obj([("server", json!(server))])),
        Command::ServerConnect {
            server,
            hostname,
            port,
            ssl,
            no_verify,
            password,
            nickname,
            username,
            realname,
        } => {
            let mut body = obj([("server", json!(server)), ("hostname", json!(hostname)), ("ssl", json!(ssl))]);
            if let Some(port) = port {
                body.insert("port".to_string(), json!(port));
            }
            if no_verify {
                body.insert("sslVerify".to_string(), json!(false));
            }
            for pair in [
                opt_str("password", password),
                opt_str("nickname", nickname),
                opt_str("username", username),
                opt_str("realname", realname),
            ]
            .into_iter()
            .flatten()
            {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("server-connect", body)
        }
        Command::ServerDisconnect { server } => {
            ("server-disconnect", server.map(|s| obj([("server", json!(s))])).unwrap_or_default())
        }
        Command::ServerReconnect { server } => {
            ("server-reconnect", server.map(|s| obj([("server", json!(s))])).unwrap_or_default())
        }
        Command::ServerJoin { server, channel, key } => {
            let mut body = obj([("server", json!(server)), ("channel", json!(channel))]);
            if let Some(pair) = opt_str("password", key) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("server-join", body)
        }
        Command::ServerPart { server, channel, reason } => {
            let mut body = obj([("server", json!(server)), ("channel", json!(channel))]);
            if let Some(pair) = opt_str("reason", reason) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("server-part", body)
        }
        Command::ServerMessage { server, target, message } => (
            "server-message",
            obj([("server", json!(server)), ("target", json!(target)), ("message", json!(message))]),
        ),
        Command::ServerNotice { server, target, message } => (
            "server-notice",
            obj([("server", json!(server)), ("target", json!(target)), ("message", json!(message))]),
        ),
        Command::ServerMe { server, target, message } => (
            "server-me",
            obj([("server", json!(server)), ("target", json!(target)), ("message", json!(message))]),
        ),
        Command::ServerMode { server, channel, mode, arguments } => (
            "server-mode",
            obj([
                ("server", json!(server)),
                ("channel", json!(channel)),
                ("mode", json!(mode)),
                ("arguments", json!(arguments)),
            ]),
        ),
        Command::ServerInvite { server, target, channel } => (
            "server-invite",
            obj([("server", json!(server)), ("target", json!(target)), ("channel", json!(channel))]),
        ),
        Command::ServerKick { server, target, channel, reason } => {
            let mut body =
                obj([("server", json!(server)), ("target", json!(target)), ("channel", json!(channel))]);
            if let Some(pair) = opt_str("reason", reason) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("server-kick", body)
        }
        Command::ServerNick { server, nickname } => {
            ("server-nick", obj([("server", json!(server)), ("nickname", json!(nickname))]))
        }
        Command::ServerTopic { server, channel, topic } => (
            "server-topic",
            obj([("server", json!(server)), ("channel", json!(channel)), ("topic", json!(topic))]),
        ),

        Command::RuleList => ("rule-list", Map::new()),
        Command::RuleAdd { servers, channels, origins, plugins, events, action, index } => {
            let mut body = obj([
                ("servers", json!(servers)),
                ("channels", json!(channels)),
                ("origins", json!(origins)),
                ("plugins", json!(plugins)),
                ("events", json!(events)),
                ("action", json!(action)),
            ]);
            if let Some(index) = index {
                body.insert("index".to_string(), json!(index));
            }
            ("rule-add", body)
        }
        Command::RuleEdit {
            index,
            add_servers,
            remove_servers,
            add_channels,
            remove_channels,
            add_origins,
            remove_origins,
            add_plugins,
            remove_plugins,
            add_events,
            remove_events,
            action,
        } => {
            let mut body = obj([
                ("index", json!(index)),
                ("add-servers", json!(add_servers)),
                ("remove-servers", json!(remove_servers)),
                ("add-channels", json!(add_channels)),
                ("remove-channels", json!(remove_channels)),
                ("add-origins", json!(add_origins)),
                ("remove-origins", json!(remove_origins)),
                ("add-plugins", json!(add_plugins)),
                ("remove-plugins", json!(remove_plugins)),
                ("add-events", json!(add_events)),
                ("remove-events", json!(remove_events)),
            ]);
            if let Some(pair) = opt_str("action", action) {
                body.insert(pair.0.to_string(), pair.1);
            }
            ("rule-edit", body)
        }
        Command::RuleMove { from, to } => ("rule-move", obj([("from", json!(from)), ("to", json!(to))])),
        Command::RuleRemove { index } => ("rule-remove", obj([("index", json!(index))])),

        Command::HookList => ("hook-list", Map::new()),
        Command::HookAdd { id, path } => {
            ("hook-add", obj([("id", json!(id)), ("path", json!(path.to_string_lossy()))]))
        }
        Command::HookRemove { id } => ("hook-remove", obj([("id", json!(id))])),

        Command::Watch => unreachable!("handled before request_for"),
    }
}

fn print_response(response: &Value) {
    match serde_json::to_string_pretty(response) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{response}"),
    }
}
