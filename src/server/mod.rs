//! Server connection lifecycle (spec.md §4.2): per-server state machine,
//! wire connection task, and channel membership tracking.

pub mod channel;
pub mod conn;
pub mod state;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub use channel::{Channel, ChannelTable, Prefix};
pub use conn::{ServerHandle, ServerInbound, ServerOutbound};
pub use state::State;

/// Shared view of every running server's handle, read by the plugin façade
/// (DESIGN NOTES §9 "Cyclic references": resolved by id on each call, never
/// captured across a suspension point) and written by the dispatcher on
/// connect/disconnect.
pub type SharedServerTable = Arc<RwLock<BTreeMap<String, ServerHandle>>>;
