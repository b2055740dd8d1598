//! The tagged event union dispatched to plugins, rules, hooks, and transport
//! subscribers (spec.md §3 "Event"). Every variant carries the originating
//! server id plus its own fields; `kind()`/`origin_channel()` back the rule
//! engine's dispatch tuple and the JSON broadcast shape of spec.md §4.6/§6.

use serde::Serialize;

/// One IRC occurrence, serialized to transport subscribers as
/// `{"event": <camelCase kind>, ...fields}` (spec.md §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "onConnect")]
    Connect { server: String },

    #[serde(rename = "onDisconnect")]
    Disconnect { server: String },

    #[serde(rename = "onInvite")]
    Invite { server: String, origin: String, channel: String },

    #[serde(rename = "onJoin")]
    Join { server: String, origin: String, channel: String },

    #[serde(rename = "onKick")]
    Kick { server: String, origin: String, channel: String, target: String, reason: String },

    #[serde(rename = "onMe")]
    Me { server: String, origin: String, channel: String, message: String },

    #[serde(rename = "onMessage")]
    Message { server: String, origin: String, channel: String, message: String },

    #[serde(rename = "onMode")]
    Mode { server: String, origin: String, channel: String, mode: String, args: Vec<String> },

    #[serde(rename = "onNames")]
    Names { server: String, channel: String, names: Vec<String> },

    #[serde(rename = "onNick")]
    Nick { server: String, origin: String, nickname: String },

    #[serde(rename = "onNotice")]
    Notice { server: String, origin: String, message: String },

    #[serde(rename = "onPart")]
    Part { server: String, origin: String, channel: String, reason: String },

    #[serde(rename = "onTopic")]
    Topic { server: String, origin: String, channel: String, topic: String },

    #[serde(rename = "onWhois")]
    Whois { server: String, nickname: String, username: String, hostname: String, realname: String },

    #[serde(rename = "onCommand")]
    Command { server: String, origin: String, channel: String, plugin: String, message: String },
}

impl Event {
    /// The server this event is tied to, used as the first coordinate of the
    /// rule engine's dispatch tuple.
    pub fn server(&self) -> &str {
        match self {
            Event::Connect { server }
            | Event::Disconnect { server }
            | Event::Invite { server, .. }
            | Event::Join { server, .. }
            | Event::Kick { server, .. }
            | Event::Me { server, .. }
            | Event::Message { server, .. }
            | Event::Mode { server, .. }
            | Event::Names { server, .. }
            | Event::Nick { server, .. }
            | Event::Notice { server, .. }
            | Event::Part { server, .. }
            | Event::Topic { server, .. }
            | Event::Whois { server, .. }
            | Event::Command { server, .. } => server,
        }
    }

    /// The channel coordinate of the dispatch tuple, if this event kind has one.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Event::Invite { channel, .. }
            | Event::Join { channel, .. }
            | Event::Kick { channel, .. }
            | Event::Me { channel, .. }
            | Event::Message { channel, .. }
            | Event::Mode { channel, .. }
            | Event::Names { channel, .. }
            | Event::Part { channel, .. }
            | Event::Topic { channel, .. }
            | Event::Command { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// The origin (nickname that caused the event) coordinate, if any.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Event::Invite { origin, .. }
            | Event::Join { origin, .. }
            | Event::Kick { origin, .. }
            | Event::Me { origin, .. }
            | Event::Message { origin, .. }
            | Event::Mode { origin, .. }
            | Event::Nick { origin, .. }
            | Event::Notice { origin, .. }
            | Event::Part { origin, .. }
            | Event::Topic { origin, .. }
            | Event::Command { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// The plugin capability-table method name this event dispatches to
    /// (spec.md §4.3 "one handler per event kind"), e.g. `onMessage`.
    pub fn handler_name(&self) -> &'static str {
        match self {
            Event::Connect { .. } => "onConnect",
            Event::Disconnect { .. } => "onDisconnect",
            Event::Invite { .. } => "onInvite",
            Event::Join { .. } => "onJoin",
            Event::Kick { .. } => "onKick",
            Event::Me { .. } => "onMe",
            Event::Message { .. } => "onMessage",
            Event::Mode { .. } => "onMode",
            Event::Names { .. } => "onNames",
            Event::Nick { .. } => "onNick",
            Event::Notice { .. } => "onNotice",
            Event::Part { .. } => "onPart",
            Event::Topic { .. } => "onTopic",
            Event::Whois { .. } => "onWhois",
            Event::Command { plugin, .. } => {
                let _ = plugin;
                "onCommand"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_exposes_dispatch_tuple_fields() {
        let ev = Event::Message {
            server: "libera".into(),
            origin: "jean".into(),
            channel: "#test".into(),
            message: "hi".into(),
        };
        assert_eq!(ev.server(), "libera");
        assert_eq!(ev.channel(), Some("#test"));
        assert_eq!(ev.origin(), Some("jean"));
        assert_eq!(ev.handler_name(), "onMessage");
    }

    #[test]
    fn serializes_with_tagged_event_field() {
        let ev = Event::Join { server: "s".into(), origin: "o".into(), channel: "#c".into() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "onJoin");
        assert_eq!(json["channel"], "#c");
    }
}
