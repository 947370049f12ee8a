//! Configuration cascade: from glob-keyed overrides to the effective config
//! of a concrete rule name.
//!
//! Raw `rules` entries are scored, merged by literal key and sorted by
//! specificity. Every glob entry then seeds its values as defaults into each
//! more specific entry it matches. Lookups pick the most specific match.

/// Deep default-merging of rule config maps.
pub mod merge;

use log::debug;
use serde::Serialize;

use crate::config::{
    Action, PartialRulebookConfig, Required, RuleConfig, RulebookConfig, SeverityMap, Verboseness,
};
use crate::error::{ConfigError, RulebookError};
use crate::pattern::{NamePattern, Specificity, is_glob, specificity};

use merge::defaults_deep;

/// A rule config after parsing: the values plus everything derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRuleConfig {
    /// The pattern this config was registered under.
    pub name: String,
    pub specificity: Specificity,
    pub values: RuleConfig,
    /// Action taken on failure. `None` means the rule is skipped.
    pub throw_action: Option<Action>,
    /// Set while another rule borrows this one through an alias.
    #[serde(skip)]
    pub is_alias_target: bool,
}

impl ParsedRuleConfig {
    fn new(name: &str, values: RuleConfig) -> Self {
        Self {
            name: name.to_string(),
            specificity: specificity(name),
            values,
            throw_action: None,
            is_alias_target: false,
        }
    }

    /// The config used when no pattern matches: `required = "must"`.
    pub fn fallback() -> Self {
        let mut values = RuleConfig::new();
        values.insert("required".into(), "must".into());
        Self {
            name: "*".into(),
            specificity: Specificity::NONE,
            values,
            throw_action: Some(Action::Error),
            is_alias_target: false,
        }
    }

    /// Whether this config came from a registered pattern.
    pub fn is_match(&self) -> bool {
        self.specificity > Specificity::NONE
    }

    /// The required level, with a missing key read as `must`.
    pub fn required(&self, rule: &str) -> Result<Option<Required>, ConfigError> {
        Required::from_config(rule, &self.values)
    }

    /// The caller-facing view: all values with `required` always present.
    pub fn public(&self) -> RuleConfig {
        let mut values = self.values.clone();
        values
            .entry("required")
            .or_insert_with(|| Required::Must.as_str().into());
        values
    }

    /// Resolve `throw_action` from the severity map.
    pub fn resolve_action(
        &mut self,
        rule: &str,
        severity: &SeverityMap,
    ) -> Result<(), ConfigError> {
        self.throw_action = self.required(rule)?.and_then(|r| severity.action_for(r));
        Ok(())
    }
}

/// A parsed entry and its compiled pattern.
#[derive(Debug, Clone)]
struct Entry {
    config: ParsedRuleConfig,
    pattern: NamePattern,
}

/// Owns the glob-keyed rule configuration of a rulebook.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    /// Generic settings. `rules` is empty once parsed.
    config: RulebookConfig,
    /// Parsed entries, ascending by specificity.
    entries: Vec<Entry>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self {
            config: RulebookConfig::default_config(),
            entries: Vec::new(),
        }
    }
}

impl ConfigResolver {
    /// Parse a full rulebook config.
    pub fn new(config: RulebookConfig) -> Result<Self, RulebookError> {
        let mut resolver = Self {
            config,
            entries: Vec::new(),
        };
        resolver.parse()?;
        Ok(resolver)
    }

    /// Merge a partial config over the built-in defaults and parse it.
    pub fn from_partial(partial: PartialRulebookConfig) -> Result<Self, RulebookError> {
        Self::new(RulebookConfig::layered(None, partial))
    }

    /// Generic settings (no rule entries).
    pub fn generic(&self) -> RulebookConfig {
        self.config.generic()
    }

    pub fn severity(&self) -> &SeverityMap {
        &self.config.severity
    }

    pub fn enforce_parallel(&self) -> bool {
        self.config.enforce_parallel
    }

    pub fn verboseness(&self) -> Verboseness {
        self.config.verboseness
    }

    /// Parsed configs, ascending by specificity.
    pub fn parsed(&self) -> impl Iterator<Item = &ParsedRuleConfig> {
        self.entries.iter().map(|e| &e.config)
    }

    /// The full config, with parsed entries folded back into `rules`.
    pub fn full(&self) -> RulebookConfig {
        let mut config = self.config.clone();
        config.rules = self
            .entries
            .iter()
            .map(|e| (e.config.name.clone(), e.config.values.clone()))
            .collect();
        config
    }

    /// Find the most specific config for a rule name.
    ///
    /// Among equally specific matches the one registered last wins.
    pub fn get(&self, name: &str) -> ParsedRuleConfig {
        let mut best: Option<&Entry> = None;
        for entry in &self.entries {
            if entry.pattern.is_match(name)
                && best.is_none_or(|b| entry.config.specificity >= b.config.specificity)
            {
                best = Some(entry);
            }
        }
        best.map_or_else(ParsedRuleConfig::fallback, |e| e.config.clone())
    }

    /// Merge a partial config over the current one (current values are
    /// defaults) and re-parse.
    pub fn set(&mut self, partial: PartialRulebookConfig) -> Result<(), RulebookError> {
        self.config.apply_overlay(partial);
        self.parse()
    }

    /// Resolve the action for `config` as used by the rule `rule`.
    pub fn resolve_action(
        &self,
        rule: &str,
        config: &mut ParsedRuleConfig,
    ) -> Result<(), ConfigError> {
        config.resolve_action(rule, &self.config.severity)
    }

    /// Fold raw `rules` into the parsed list and cascade.
    fn parse(&mut self) -> Result<(), RulebookError> {
        if self.config.rules.is_empty() {
            debug!("No unparsed configuration found. Will not parse.");
            return Ok(());
        }
        debug!("Unparsed configuration found. Parsing now...");

        for (name, mut values) in std::mem::take(&mut self.config.rules) {
            match self.entries.iter().position(|e| e.config.name == name) {
                Some(i) => {
                    let existing = &mut self.entries[i].config;
                    defaults_deep(&mut values, &existing.values);
                    existing.values = values;
                }
                None => self.entries.push(Entry {
                    pattern: NamePattern::new(&name)?,
                    config: ParsedRuleConfig::new(&name, values),
                }),
            }
        }

        // Stable: equal specificity keeps registration order
        self.entries.sort_by_key(|e| e.config.specificity);
        self.cascade();
        Ok(())
    }

    /// Seed every glob entry's values into the more specific entries it matches.
    fn cascade(&mut self) {
        for source in 0..self.entries.len() {
            if !is_glob(&self.entries[source].config.name) {
                continue;
            }
            let (head, tail) = self.entries.split_at_mut(source + 1);
            let source = &head[source];
            for target in tail.iter_mut() {
                if target.config.specificity > source.config.specificity
                    && source.pattern.is_match(&target.config.name)
                {
                    defaults_deep(&mut target.config.values, &source.config.values);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn map(v: Value) -> RuleConfig {
        crate::config::rule_config(v, "test").unwrap()
    }

    fn resolver(rules: Value) -> ConfigResolver {
        ConfigResolver::from_partial(
            PartialRulebookConfig::from_value(json!({ "rules": rules })).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn unmatched_name_gets_fallback() {
        let r = ConfigResolver::default();
        let c = r.get("anything");
        assert_eq!(c.specificity, Specificity::NONE);
        assert_eq!(c.name, "*");
        assert_eq!(c.public(), map(json!({ "required": "must" })));
        assert!(!c.is_match());
    }

    #[test]
    fn cascades_broad_pattern_into_specific_one() {
        let mut r = resolver(json!({ "foo-*": { "x": 1 } }));
        r.set(PartialRulebookConfig::new().rule("foo-bar", map(json!({ "y": 2 }))))
            .unwrap();

        assert_eq!(r.get("foo-bar").values, map(json!({ "x": 1, "y": 2 })));
        assert_eq!(r.get("foo-baz").values, map(json!({ "x": 1 })));
    }

    #[test]
    fn specific_values_are_not_overridden_by_cascade() {
        let r = resolver(json!({
            "string/*": { "required": "should", "max": 10 },
            "string/date": { "max": 3 },
        }));
        assert_eq!(
            r.get("string/date").values,
            map(json!({ "required": "should", "max": 3 }))
        );
    }

    #[test]
    fn cascade_chains_through_intermediate_globs() {
        let r = resolver(json!({
            "a/**": { "x": 1 },
            "a/b/*": { "y": 2 },
            "a/b/c": { "z": 3 },
        }));
        assert_eq!(r.get("a/b/c").values, map(json!({ "x": 1, "y": 2, "z": 3 })));
        assert_eq!(r.get("a/b/d").values, map(json!({ "x": 1, "y": 2 })));
    }

    #[test]
    fn most_specific_match_wins() {
        let r = resolver(json!({
            "*": { "level": "any" },
            "foo/*": { "level": "foo" },
            "foo/bar": { "level": "bar" },
        }));
        assert_eq!(r.get("foo/bar").values["level"], "bar");
        assert_eq!(r.get("foo/baz").values["level"], "foo");
        assert_eq!(r.get("qux").values["level"], "any");
    }

    #[test]
    fn equal_specificity_last_registered_wins() {
        let r = resolver(json!({
            "foo-?": { "hit": "first" },
            "foo-[ab]": { "hit": "second" },
        }));
        assert_eq!(r.get("foo-a").values["hit"], "second");
        // Only the first pattern matches here
        assert_eq!(r.get("foo-c").values["hit"], "first");
    }

    #[test]
    fn get_is_idempotent() {
        let r = resolver(json!({ "foo-*": { "x": 1 }, "foo-bar": { "y": 2 } }));
        assert_eq!(r.get("foo-bar"), r.get("foo-bar"));
        assert_eq!(r.get("nope"), r.get("nope"));
    }

    #[test]
    fn set_merges_into_existing_entry() {
        let mut r = resolver(json!({ "foo": { "a": 1, "b": 1 } }));
        r.set(PartialRulebookConfig::new().rule("foo", map(json!({ "b": 2 }))))
            .unwrap();
        assert_eq!(r.get("foo").values, map(json!({ "a": 1, "b": 2 })));
        assert_eq!(r.parsed().count(), 1);
    }

    #[test]
    fn parsed_entries_are_sorted_and_raw_rules_cleared() {
        let r = resolver(json!({
            "a-b-c": {},
            "a": {},
            "a-b": {},
        }));
        let names: Vec<&str> = r.parsed().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a-b", "a-b-c"]);
        assert!(r.generic().rules.is_empty());
        assert_eq!(r.full().rules.len(), 3);
    }

    #[test]
    fn set_keeps_generic_settings() {
        let partial = PartialRulebookConfig::new().enforce_parallel(true);
        let mut r = ConfigResolver::from_partial(partial).unwrap();
        r.set(PartialRulebookConfig::new().rule("x", RuleConfig::new())).unwrap();
        assert!(r.enforce_parallel());
    }

    #[test]
    fn resolves_actions_from_severity() {
        let r = resolver(json!({
            "a": { "required": "should" },
            "b": { "required": "omit" },
            "c": { "required": null },
            "d": { "required": "nope" },
        }));
        let action = |name: &str| {
            let mut c = r.get(name);
            r.resolve_action(name, &mut c).map(|_| c.throw_action)
        };
        assert_eq!(action("a").unwrap(), Some(Action::Warn));
        assert_eq!(action("b").unwrap(), None);
        assert_eq!(action("c").unwrap(), None);
        assert_eq!(action("other").unwrap(), Some(Action::Error));
        let err = action("d").unwrap_err();
        assert!(err.message().contains("'nope'"));
    }

    #[test]
    fn invalid_pattern_fails_parse() {
        let err = ConfigResolver::from_partial(
            PartialRulebookConfig::new().rule("foo[", RuleConfig::new()),
        )
        .unwrap_err();
        assert!(matches!(err, RulebookError::InvalidPattern { .. }));
    }
}
