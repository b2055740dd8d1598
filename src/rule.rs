//! Rule engine (spec.md §4.4): an ordered accept/drop filter evaluated once
//! per (server, channel, origin, plugin, event) dispatch tuple before every
//! plugin invocation.
//!
//! Open Question (spec.md §9) resolved here: the source is inconsistent about
//! whether origin matching is case-insensitive. This implementation makes
//! both channel and origin matching case-insensitive, same as channel always
//! was, rather than carrying the inconsistency forward.

use std::collections::BTreeSet;

use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Accept,
    Drop,
}

/// A single dispatch tuple to evaluate against the rule list. `channel` and
/// `origin` are compared case-insensitively; `server`, `plugin`, and `event`
/// are compared exactly.
pub struct Dispatch<'a> {
    pub server: &'a str,
    pub channel: Option<&'a str>,
    pub origin: Option<&'a str>,
    pub plugin: &'a str,
    pub event: &'a str,
}

/// One match-set per dimension; an empty set matches anything (spec.md §3
/// "Rule"). Kept as `BTreeSet` so `rule-list` responses are deterministically
/// ordered regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub servers: BTreeSet<String>,
    #[serde(default)]
    pub channels: BTreeSet<String>,
    #[serde(default)]
    pub origins: BTreeSet<String>,
    #[serde(default)]
    pub plugins: BTreeSet<String>,
    #[serde(default)]
    pub events: BTreeSet<String>,
    pub action: Action,
}

impl Rule {
    fn matches(&self, d: &Dispatch<'_>) -> bool {
        set_matches(&self.servers, Some(d.server), false)
            && set_matches(&self.channels, d.channel, true)
            && set_matches(&self.origins, d.origin, true)
            && set_matches(&self.plugins, Some(d.plugin), false)
            && set_matches(&self.events, Some(d.event), false)
    }
}

fn set_matches(set: &BTreeSet<String>, value: Option<&str>, case_insensitive: bool) -> bool {
    if set.is_empty() {
        return true;
    }
    let Some(value) = value else { return true };

    if case_insensitive {
        set.iter().any(|candidate| candidate.eq_ignore_ascii_case(value))
    } else {
        set.iter().any(|candidate| candidate == value)
    }
}

/// A set-mutation patch applied by `rule-edit` (spec.md §4.4): for each
/// dimension, values to add and values to remove, plus an optional action
/// overwrite.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub add_servers: BTreeSet<String>,
    pub remove_servers: BTreeSet<String>,
    pub add_channels: BTreeSet<String>,
    pub remove_channels: BTreeSet<String>,
    pub add_origins: BTreeSet<String>,
    pub remove_origins: BTreeSet<String>,
    pub add_plugins: BTreeSet<String>,
    pub remove_plugins: BTreeSet<String>,
    pub add_events: BTreeSet<String>,
    pub remove_events: BTreeSet<String>,
    pub action: Option<Action>,
}

fn apply_patch_set(set: &mut BTreeSet<String>, add: &BTreeSet<String>, remove: &BTreeSet<String>) {
    for value in remove {
        set.remove(value);
    }
    for value in add {
        set.insert(value.clone());
    }
}

/// The bot's rule list, owned by the dispatcher (DESIGN NOTES: rules have no
/// cyclic references, so this is a plain value, not a façade).
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    rules: Vec<Rule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluates every rule in order; the last match wins. An empty list, or
    /// a tuple matched by nothing, yields `Accept` (spec.md §4.4).
    pub fn evaluate(&self, dispatch: &Dispatch<'_>) -> Action {
        let mut decision = Action::Accept;
        for rule in &self.rules {
            if rule.matches(dispatch) {
                decision = rule.action;
            }
        }
        decision
    }

    /// Inserts at `index` (appending if `index` is `None` or past the end).
    pub fn add(&mut self, rule: Rule, index: Option<usize>) {
        match index {
            Some(i) if i <= self.rules.len() => self.rules.insert(i, rule),
            _ => self.rules.push(rule),
        }
    }

    pub fn remove(&mut self, index: usize) -> Result<(), RuleError> {
        if index >= self.rules.len() {
            return Err(RuleError::InvalidIndex);
        }
        self.rules.remove(index);
        Ok(())
    }

    pub fn edit(&mut self, index: usize, patch: RulePatch) -> Result<(), RuleError> {
        let rule = self.rules.get_mut(index).ok_or(RuleError::InvalidIndex)?;

        apply_patch_set(&mut rule.servers, &patch.add_servers, &patch.remove_servers);
        apply_patch_set(&mut rule.channels, &patch.add_channels, &patch.remove_channels);
        apply_patch_set(&mut rule.origins, &patch.add_origins, &patch.remove_origins);
        apply_patch_set(&mut rule.plugins, &patch.add_plugins, &patch.remove_plugins);
        apply_patch_set(&mut rule.events, &patch.add_events, &patch.remove_events);

        if let Some(action) = patch.action {
            rule.action = action;
        }

        Ok(())
    }

    /// Removes the rule at `from` and reinserts it so its new index equals
    /// `to`; indices between `from` and `to` shift by one (spec.md §4.4).
    pub fn move_rule(&mut self, from: usize, to: usize) -> Result<(), RuleError> {
        if from >= self.rules.len() || to >= self.rules.len() {
            return Err(RuleError::InvalidIndex);
        }
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(servers: &[&str], channels: &[&str], action: Action) -> Rule {
        Rule {
            servers: servers.iter().map(|s| s.to_string()).collect(),
            channels: channels.iter().map(|s| s.to_string()).collect(),
            action,
            ..Default::default()
        }
    }

    #[test]
    fn empty_list_accepts() {
        let list = RuleList::new();
        let d = Dispatch { server: "s1", channel: Some("#x"), origin: None, plugin: "p", event: "onMessage" };
        assert_eq!(list.evaluate(&d), Action::Accept);
    }

    #[test]
    fn last_match_wins() {
        let mut list = RuleList::new();
        list.add(rule(&["s1"], &[], Action::Drop), None);
        list.add(rule(&[], &["#x"], Action::Accept), None);

        let hit = Dispatch { server: "s1", channel: Some("#x"), origin: None, plugin: "p", event: "onMessage" };
        assert_eq!(list.evaluate(&hit), Action::Accept);

        let miss = Dispatch { server: "s1", channel: Some("#y"), origin: None, plugin: "p", event: "onMessage" };
        assert_eq!(list.evaluate(&miss), Action::Drop);
    }

    #[test]
    fn channel_and_origin_match_case_insensitively() {
        let mut list = RuleList::new();
        let mut r = rule(&[], &["#Test"], Action::Drop);
        r.origins.insert("Jean".into());
        list.add(r, None);

        let d = Dispatch { server: "s1", channel: Some("#test"), origin: Some("jean"), plugin: "p", event: "onMessage" };
        assert_eq!(list.evaluate(&d), Action::Drop);
    }

    #[test]
    fn edit_applies_add_and_remove_sets() {
        let mut list = RuleList::new();
        list.add(rule(&["s1"], &[], Action::Drop), None);

        let patch = RulePatch {
            add_channels: ["#new".to_string()].into_iter().collect(),
            remove_servers: ["s1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        list.edit(0, patch).unwrap();

        assert!(list.list()[0].servers.is_empty());
        assert!(list.list()[0].channels.contains("#new"));
    }

    #[test]
    fn move_rule_reorders() {
        let mut list = RuleList::new();
        list.add(rule(&["a"], &[], Action::Accept), None);
        list.add(rule(&["b"], &[], Action::Drop), None);
        list.add(rule(&["c"], &[], Action::Accept), None);

        list.move_rule(0, 2).unwrap();
        let ids: Vec<_> = list.list().iter().map(|r| r.servers.iter().next().cloned().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn out_of_range_index_errors() {
        let mut list = RuleList::new();
        assert_eq!(list.remove(0), Err(RuleError::InvalidIndex));
    }
}
