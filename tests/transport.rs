//! End-to-end tests of the JSON control transport (spec.md §4.6): dial a real
//! Unix socket the daemon is listening on, drive the greeting/auth/command
//! lifecycle through `irccd::ctl::Session` exactly the way `irccdctl` does,
//! and check the responses the command registry produces.
//!
//! Grounded on the pattern in `server/server-testable/src/ws/tests.rs` (bind a
//! real listener, drive it with a real client over the loopback transport
//! rather than mocking the socket), adapted from websocket/axum to this
//! crate's Unix-socket JSON framing. `tempfile` provides throwaway socket
//! paths the way it does fixture files elsewhere in the pack.

use irccd::bot::Bot;
use irccd::config::{Config, HookConfig, TransportBind, TransportEndpoint};
use irccd::ctl::{CtlError, Endpoint, Session};
use irccd::logging::default_logger;
use irccd::rule::{Action, Rule};
use irccd::transport;

fn socket_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

/// Builds a `Config` with no servers or plugins (so `Bot::from_config` never
/// dials real network I/O) and one transport endpoint, plus whatever rules
/// and hooks the caller wants pre-populated.
fn test_config(bind: TransportBind, password: Option<&str>, rules: Vec<Rule>, hooks: Vec<HookConfig>) -> Config {
    let mut config = Config::default();
    config.transport.endpoints.push(TransportEndpoint { bind, password: password.map(String::from), tls: None });
    config.rules = rules;
    config.hooks = hooks;
    config
}

/// Spawns the bot and its transport listener on a fresh `LocalSet`, then runs
/// `body` against a connected `Session`. `Bot` is `!Send` (a loaded JS
/// plugin's `boa_engine::Context` is `Rc`-based) so its run loop has to live
/// on a `LocalSet`, exactly as `bin/irccd.rs` does it.
async fn with_bot<F, Fut>(config: Config, endpoint: Endpoint, password: Option<&str>, body: F)
where
    F: FnOnce(Session) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let endpoints = config.transport.endpoints.clone();
    let (bot, requests_tx) = Bot::from_config(config, default_logger());

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            transport::spawn_all(&endpoints, requests_tx).await.expect("transport endpoints bind");
            tokio::task::spawn_local(bot.run());

            // Give the accept loop a moment to start listening.
            tokio::task::yield_now().await;

            let session = Session::connect(&endpoint, password).await.expect("client connects");
            body(session).await;
        })
        .await;
}

#[tokio::test]
async fn greeting_advertises_program_and_no_tls() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let config = test_config(TransportBind::Unix(path.clone()), None, Vec::new(), Vec::new());

    with_bot(config, Endpoint::Unix(path), None, |session| async move {
        assert_eq!(session.greeting["program"], "irccd");
        assert_eq!(session.greeting["ssl"], false);
    })
    .await;
}

#[tokio::test]
async fn rule_list_reflects_configured_rules() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let mut rule = Rule::default();
    rule.servers.insert("libera".to_string());
    rule.action = Action::Drop;
    let config = test_config(TransportBind::Unix(path.clone()), None, vec![rule], Vec::new());

    with_bot(config, Endpoint::Unix(path), None, |mut session| async move {
        let response = session.call("rule-list", serde_json::Map::new()).await.expect("rule-list succeeds");
        assert_eq!(response["command"], "rule-list");
        let list = response["list"].as_array().expect("list field is an array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["action"], "drop");
    })
    .await;
}

#[tokio::test]
async fn hook_list_reflects_configured_hooks() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let hook = HookConfig { id: "notify".to_string(), path: "/usr/local/bin/notify-hook".into() };
    let config = test_config(TransportBind::Unix(path.clone()), None, Vec::new(), vec![hook]);

    with_bot(config, Endpoint::Unix(path), None, |mut session| async move {
        let response = session.call("hook-list", serde_json::Map::new()).await.expect("hook-list succeeds");
        let list = response["list"].as_array().expect("list field is an array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "notify");
    })
    .await;
}

#[tokio::test]
async fn unknown_command_returns_invalid_command_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let config = test_config(TransportBind::Unix(path.clone()), None, Vec::new(), Vec::new());

    with_bot(config, Endpoint::Unix(path), None, |mut session| async move {
        let err = session.call("not-a-real-command", serde_json::Map::new()).await.unwrap_err();
        match err {
            CtlError::Remote { category, code, .. } => {
                assert_eq!(category, "irccd");
                assert_eq!(code, 6); // IrccdError::InvalidCommand
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn password_protected_endpoint_rejects_bad_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let config = test_config(TransportBind::Unix(path.clone()), Some("s3cr3t"), Vec::new(), Vec::new());

    let endpoints = config.transport.endpoints.clone();
    let (bot, requests_tx) = Bot::from_config(config, default_logger());

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            transport::spawn_all(&endpoints, requests_tx).await.expect("transport endpoints bind");
            tokio::task::spawn_local(bot.run());
            tokio::task::yield_now().await;

            let result = Session::connect(&Endpoint::Unix(path.clone()), Some("wrong")).await;
            assert!(matches!(result, Err(CtlError::AuthRejected)));

            // The correct password still works on a fresh connection.
            let session = Session::connect(&Endpoint::Unix(path), Some("s3cr3t")).await;
            assert!(session.is_ok());
        })
        .await;
}

#[tokio::test]
async fn rule_add_then_remove_round_trips_through_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "irccd.sock");
    let config = test_config(TransportBind::Unix(path.clone()), None, Vec::new(), Vec::new());

    with_bot(config, Endpoint::Unix(path), None, |mut session| async move {
        let add_body: serde_json::Map<String, serde_json::Value> = [
            ("servers".to_string(), serde_json::json!(["libera"])),
            ("channels".to_string(), serde_json::json!([])),
            ("origins".to_string(), serde_json::json!([])),
            ("plugins".to_string(), serde_json::json!([])),
            ("events".to_string(), serde_json::json!(["onMessage"])),
            ("action".to_string(), serde_json::json!("accept")),
        ]
        .into_iter()
        .collect();
        session.call("rule-add", add_body).await.expect("rule-add succeeds");

        let listed = session.call("rule-list", serde_json::Map::new()).await.expect("rule-list succeeds");
        assert_eq!(listed["list"].as_array().unwrap().len(), 1);

        let mut remove_body = serde_json::Map::new();
        remove_body.insert("index".to_string(), serde_json::json!(0));
        session.call("rule-remove", remove_body).await.expect("rule-remove succeeds");

        let listed = session.call("rule-list", serde_json::Map::new()).await.expect("rule-list succeeds");
        assert!(listed["list"].as_array().unwrap().is_empty());
    })
    .await;
}

