//! Transport control plane (spec.md §4.6): framed JSON over Unix/TCP/TLS
//! sockets, by which an `irccdctl`-style client issues commands and receives
//! responses or streamed events.

pub mod client;
pub mod frame;
pub mod listener;

pub use listener::spawn_all;
