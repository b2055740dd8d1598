//! Error taxonomy for the bot (spec.md §7): four categories, each with a small
//! integer code, serialized into the transport response envelope.

use serde::Serialize;
use thiserror::Error;

/// Category tag sent to transport clients alongside `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Irccd,
    Server,
    Plugin,
    Rule,
}

/// Protocol-level errors that also close the offending transport client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IrccdError {
    #[error("remote is not an irccd instance")]
    NotIrccd,
    #[error("incompatible version")]
    IncompatibleVersion,
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid authentication")]
    InvalidAuth,
    #[error("invalid message")]
    InvalidMessage,
    #[error("invalid command")]
    InvalidCommand,
    #[error("incomplete message")]
    IncompleteMessage,
}

impl IrccdError {
    pub fn code(self) -> i32 {
        match self {
            IrccdError::NotIrccd => 1,
            IrccdError::IncompatibleVersion => 2,
            IrccdError::AuthRequired => 3,
            IrccdError::InvalidAuth => 4,
            IrccdError::InvalidMessage => 5,
            IrccdError::InvalidCommand => 6,
            IrccdError::IncompleteMessage => 7,
        }
    }

    /// Protocol violations terminate the connection per spec.md §4.7.
    pub fn is_protocol_violation(self) -> bool {
        matches!(self, IrccdError::InvalidAuth | IrccdError::InvalidMessage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("server not found: {0}")]
    NotFound(String),
    #[error("server already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid server identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("server not connected: {0}")]
    NotConnected(String),
    #[error("server already connected: {0}")]
    AlreadyConnected(String),
}

impl ServerError {
    pub fn code(&self) -> i32 {
        match self {
            ServerError::NotFound(_) => 1,
            ServerError::AlreadyExists(_) => 2,
            ServerError::InvalidIdentifier(_) => 3,
            ServerError::InvalidHostname(_) => 4,
            ServerError::InvalidPort(_) => 5,
            ServerError::InvalidChannel(_) => 6,
            ServerError::InvalidTarget(_) => 7,
            ServerError::NotConnected(_) => 8,
            ServerError::AlreadyConnected(_) => 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(String),
    #[error("plugin already exists: {0}")]
    AlreadyExists(String),
    #[error("plugin execution error: {0}")]
    ExecError(String),
    #[error("invalid plugin identifier: {0}")]
    InvalidIdentifier(String),
}

impl PluginError {
    pub fn code(&self) -> i32 {
        match self {
            PluginError::NotFound(_) => 1,
            PluginError::AlreadyExists(_) => 2,
            PluginError::ExecError(_) => 3,
            PluginError::InvalidIdentifier(_) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("invalid rule index")]
    InvalidIndex,
    #[error("invalid rule action")]
    InvalidAction,
}

impl RuleError {
    pub fn code(self) -> i32 {
        match self {
            RuleError::InvalidIndex => 1,
            RuleError::InvalidAction => 2,
        }
    }
}

/// Unified error type a command handler may raise (DESIGN NOTES §9: `Command` and
/// `RemoteCommand` collapsed into one abstraction, so one error type covers both).
#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error(transparent)]
    Irccd(#[from] IrccdError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl BotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BotError::Irccd(_) => ErrorCategory::Irccd,
            BotError::Server(_) => ErrorCategory::Server,
            BotError::Plugin(_) => ErrorCategory::Plugin,
            BotError::Rule(_) => ErrorCategory::Rule,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            BotError::Irccd(e) => e.code(),
            BotError::Server(e) => e.code(),
            BotError::Plugin(e) => e.code(),
            BotError::Rule(e) => e.code(),
        }
    }

    /// Whether the transport must close the client after sending this error.
    pub fn closes_client(&self) -> bool {
        matches!(self, BotError::Irccd(e) if e.is_protocol_violation())
    }
}

pub type BotResult<T> = Result<T, BotError>;
