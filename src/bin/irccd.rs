//! Daemon entry point (spec.md §6/§7): loads configuration, builds the
//! [`Bot`], opens every transport endpoint, and drives the dispatcher loop
//! for the life of the process.
//!
//! Grounded on the teacher's `clap::Parser` CLI pattern (`src/args.rs`) and
//! `tokio::main` shape (`src/main.rs`), generalized from a single hardcoded
//! connection into config-driven startup with hot-reload.
//!
//! `Bot` is `!Send` (a loaded JS plugin's `boa_engine::Context` is
//! `Rc`-based), so its run loop cannot cross a `tokio::spawn` boundary onto
//! the multi-threaded executor. It runs directly inside a
//! [`tokio::task::LocalSet`] instead; every other task here (transport
//! listeners, the config watcher) only ever touches `Send` types and stays
//! on the default executor.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use irccd::bot::{Bot, BotRequest};
use irccd::config::Config;
use irccd::logging::default_logger;
use irccd::transport;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "irccd", about = "IRC bot daemon")]
struct Cli {
    /// Configuration file (overrides $IRCCD_CONFIG and the default search path).
    #[arg(short = 'c', long = "config", value_name = "path")]
    config: Option<PathBuf>,

    /// Emit debug-level diagnostics in addition to info/warning.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Suppress info-level diagnostics, keeping only warnings.
    #[arg(short = 's', long = "silent", conflicts_with = "verbose")]
    silent: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config_path = match resolve_config_path(cli.config.clone()) {
        Some(path) => path,
        None => {
            eprintln!("error: no configuration file found (pass -c, set $IRCCD_CONFIG, or create ~/.config/irccd/irccd.conf)");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {config_path} could not be read: {err}", config_path = config_path.display());
            return ExitCode::FAILURE;
        }
    };

    let endpoints = config.transport.endpoints.clone();
    let logger = default_logger();
    let (bot, requests_tx) = Bot::from_config(config, logger);

    if let Err(err) = transport::spawn_all(&endpoints, requests_tx.clone()).await {
        eprintln!("error: failed to open transport endpoints: {err}");
        return ExitCode::FAILURE;
    }

    let _watcher = spawn_config_watcher(config_path, requests_tx);

    let local = tokio::task::LocalSet::new();
    local.run_until(bot.run()).await;

    ExitCode::SUCCESS
}

fn init_tracing(cli: &Cli) {
    let directive = if cli.verbose { "debug" } else if cli.silent { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `IRCCD_CONFIG` beats `-c`, which beats the XDG-style user search path
/// (spec.md §6 "Environment variables"; grounded on
/// `examples/original_source/libcommon/irccd/system.cpp`'s
/// `add_config_user_path`, which prefers `$XDG_CONFIG_HOME` over
/// `$HOME/.config`).
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Ok(path) = std::env::var("IRCCD_CONFIG") {
        return Some(PathBuf::from(path));
    }
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("irccd").join("irccd.conf");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        let candidate = PathBuf::from(home).join(".config").join("irccd").join("irccd.conf");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Watches the config file and feeds `BotRequest::ReloadConfig` through the
/// same channel transport clients use, so reloading never needs a lock
/// around `Bot`'s state (spec.md §5 "single-threaded cooperative reactor").
/// Full plugin/server reload is out of scope; only rules and hooks are
/// refreshed (see `Bot::reload_rules_and_hooks` and DESIGN.md).
fn spawn_config_watcher(path: PathBuf, requests: mpsc::Sender<BotRequest>) -> Option<notify::RecommendedWatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watch_path = path.clone();

    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res
            && event.kind.is_modify()
        {
            let _ = tx.send(());
        }
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            tracing::warn!(error = %err, "config hot-reload disabled: failed to create watcher");
            return None;
        }
    };

    if let Err(err) = watcher.watch(&watch_path, RecursiveMode::NonRecursive) {
        tracing::warn!(error = %err, path = %watch_path.display(), "config hot-reload disabled: failed to watch file");
        return None;
    }

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // Editors often rewrite-then-rename; give the new file a moment to settle.
            tokio::time::sleep(Duration::from_millis(200)).await;
            match Config::load(&path) {
                Ok(config) => {
                    if requests.send(BotRequest::ReloadConfig(Box::new(config))).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "config reload skipped: file failed to parse"),
            }
        }
    });

    Some(watcher)
}
