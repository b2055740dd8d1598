//! Channel membership tracking from JOIN/PART/KICK/QUIT/NAMES(353)/MODE
//! (spec.md §4.2).

use std::collections::BTreeMap;

/// The subset of mode-derived status prefixes irccd tracks per member, in
/// descending rank (`Owner` outranks `Op` outranks `Voice`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Prefix {
    None,
    Voice,
    HalfOp,
    Op,
    Admin,
    Owner,
}

impl Prefix {
    fn from_353_char(c: char) -> (Prefix, bool) {
        match c {
            '~' => (Prefix::Owner, true),
            '&' => (Prefix::Admin, true),
            '@' => (Prefix::Op, true),
            '%' => (Prefix::HalfOp, true),
            '+' => (Prefix::Voice, true),
            _ => (Prefix::None, false),
        }
    }

    fn from_mode_char(mode: char) -> Option<Prefix> {
        Some(match mode {
            'q' => Prefix::Owner,
            'a' => Prefix::Admin,
            'o' => Prefix::Op,
            'h' => Prefix::HalfOp,
            'v' => Prefix::Voice,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub name: String,
    pub topic: Option<String>,
    members: BTreeMap<String, Prefix>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Channel { name: name.into(), topic: None, members: BTreeMap::new() }
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, Prefix)> {
        self.members.iter().map(|(nick, prefix)| (nick.as_str(), *prefix))
    }

    pub fn is_member(&self, nick: &str) -> bool {
        self.members.contains_key(nick)
    }

    pub fn add_member(&mut self, nick: impl Into<String>, prefix: Prefix) {
        self.members.insert(nick.into(), prefix);
    }

    pub fn remove_member(&mut self, nick: &str) {
        self.members.remove(nick);
    }

    pub fn rename_member(&mut self, old: &str, new: &str) {
        if let Some(prefix) = self.members.remove(old) {
            self.members.insert(new.to_string(), prefix);
        }
    }

    /// Parses a single RPL_NAMREPLY (353) nick token such as `@jean` or `+alice`.
    pub fn add_names_token(&mut self, token: &str) {
        let mut chars = token.chars();
        let Some(first) = chars.next() else { return };
        let (prefix, consumed) = Prefix::from_353_char(first);
        let nick = if consumed { chars.as_str() } else { token };
        self.members.insert(nick.to_string(), prefix);
    }

    /// Applies a channel MODE change such as `+o jean` or `-v alice`.
    pub fn apply_mode(&mut self, mode: &str, args: &[String]) {
        let mut adding = true;
        let mut arg_idx = 0;

        for c in mode.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                c => {
                    if let Some(prefix) = Prefix::from_mode_char(c) {
                        if let Some(nick) = args.get(arg_idx) {
                            if adding {
                                self.members.insert(nick.clone(), prefix);
                            } else if let Some(entry) = self.members.get_mut(nick) {
                                *entry = Prefix::None;
                            }
                        }
                        arg_idx += 1;
                    } else if matches!(c, 'k' | 'l' | 'b' | 'e' | 'I') {
                        arg_idx += 1;
                    }
                }
            }
        }
    }
}

/// All channels the bot currently occupies on one server.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: BTreeMap<String, Channel>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    pub fn entry(&mut self, name: &str) -> &mut Channel {
        self.channels.entry(name.to_string()).or_insert_with(|| Channel::new(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.channels.remove(name);
    }

    pub fn remove_member_everywhere(&mut self, nick: &str) {
        for channel in self.channels.values_mut() {
            channel.remove_member(nick);
        }
    }

    pub fn rename_member_everywhere(&mut self, old: &str, new: &str) {
        for channel in self.channels.values_mut() {
            channel.rename_member(old, new);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_token_strips_prefix() {
        let mut ch = Channel::new("#test");
        ch.add_names_token("@jean");
        ch.add_names_token("alice");
        assert!(ch.is_member("jean"));
        assert_eq!(ch.members().find(|(n, _)| *n == "jean").unwrap().1, Prefix::Op);
        assert_eq!(ch.members().find(|(n, _)| *n == "alice").unwrap().1, Prefix::None);
    }

    #[test]
    fn mode_grants_and_revokes_prefix() {
        let mut ch = Channel::new("#test");
        ch.add_member("jean", Prefix::None);
        ch.apply_mode("+o", &["jean".to_string()]);
        assert_eq!(ch.members().find(|(n, _)| *n == "jean").unwrap().1, Prefix::Op);
        ch.apply_mode("-o", &["jean".to_string()]);
        assert_eq!(ch.members().find(|(n, _)| *n == "jean").unwrap().1, Prefix::None);
    }

    #[test]
    fn table_tracks_quit_across_channels() {
        let mut table = ChannelTable::new();
        table.entry("#a").add_member("jean", Prefix::None);
        table.entry("#b").add_member("jean", Prefix::Voice);
        table.remove_member_everywhere("jean");
        assert!(!table.get("#a").unwrap().is_member("jean"));
        assert!(!table.get("#b").unwrap().is_member("jean"));
    }
}
