use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::resolve::merge::defaults_deep;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Per-rule configuration: `required` plus any caller-defined fields.
pub type RuleConfig = Map<String, Value>;

/// Turn a JSON value into a rule config, rejecting anything but an object.
pub fn rule_config(value: impl Into<Value>, context: &str) -> Result<RuleConfig, ConfigError> {
    match value.into() {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(RuleConfig::new()),
        other => Err(ConfigError::new(format!(
            "configuration for '{context}' must be a table, found {other}"
        ))),
    }
}

// ── Levels ──

/// What happens when a rule fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Error,
    Warn,
    Info,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Error => "error",
            Action::Warn => "warn",
            Action::Info => "info",
        }
    }
}

/// How important a rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Required {
    Must,
    Should,
    May,
    Optional,
    Omit,
}

impl Required {
    pub const ALL: [Required; 5] = [
        Required::Must,
        Required::Should,
        Required::May,
        Required::Optional,
        Required::Omit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Required::Must => "must",
            Required::Should => "should",
            Required::May => "may",
            Required::Optional => "optional",
            Required::Omit => "omit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Required::Must => "MUST",
            Required::Should => "SHOULD",
            Required::May => "MAY",
            Required::Optional => "OPTIONAL",
            Required::Omit => "OMIT",
        }
    }

    /// Read the `required` key of a rule config.
    ///
    /// A missing key means `must`; an explicit `null` means the rule is off.
    pub fn from_config(rule: &str, config: &RuleConfig) -> Result<Option<Self>, ConfigError> {
        match config.get("required") {
            None => Ok(Some(Required::Must)),
            Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let lower = s.to_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|r| r.as_str() == lower)
                    .map(Some)
                    .ok_or_else(|| ConfigError::unknown_required(rule, s))
            }
            Some(other) => Err(ConfigError::unknown_required(rule, &other.to_string())),
        }
    }
}

/// Log level for the whole rulebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verboseness {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl Verboseness {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verboseness::Error => LevelFilter::Error,
            Verboseness::Warn => LevelFilter::Warn,
            Verboseness::Info => LevelFilter::Info,
            Verboseness::Debug => LevelFilter::Debug,
        }
    }
}

/// Maps each required level to the action taken when a rule of that level fails.
/// `omit` never maps to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityMap {
    pub must: Option<Action>,
    pub should: Option<Action>,
    pub may: Option<Action>,
    pub optional: Option<Action>,
}

impl SeverityMap {
    pub fn action_for(&self, required: Required) -> Option<Action> {
        match required {
            Required::Must => self.must,
            Required::Should => self.should,
            Required::May => self.may,
            Required::Optional => self.optional,
            Required::Omit => None,
        }
    }
}

// ── Final (merged) config ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulebookConfig {
    #[serde(default)]
    pub verboseness: Verboseness,
    pub severity: SeverityMap,
    /// Enforce matched rules concurrently instead of one after another.
    #[serde(default, alias = "enforceParallel")]
    pub enforce_parallel: bool,
    /// Raw rule configuration keyed by name pattern. Emptied once parsed.
    #[serde(default)]
    pub rules: IndexMap<String, RuleConfig>,
}

impl Default for RulebookConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

// ── Overlay (partial config merged over defaults) ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityOverlay {
    pub must: Option<Action>,
    pub should: Option<Action>,
    pub may: Option<Action>,
    pub optional: Option<Action>,
}

/// A partial rulebook configuration, as supplied by callers or a config file.
/// Every field that is present wins over the config it is applied to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRulebookConfig {
    pub verboseness: Option<Verboseness>,
    #[serde(default)]
    pub severity: SeverityOverlay,
    #[serde(alias = "enforceParallel")]
    pub enforce_parallel: Option<bool>,
    #[serde(default)]
    pub rules: IndexMap<String, RuleConfig>,
}

impl PartialRulebookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a partial config from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a partial config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read a partial config from a TOML file. `~` and `$VARS` in the path are expanded.
    pub fn load(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        let path = expand_path(path.as_ref())?;
        let content =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::io(&path, &e))?;
        Self::from_toml_str(&content)
    }

    /// Configure the rules matching `pattern`.
    pub fn rule(mut self, pattern: impl Into<String>, config: RuleConfig) -> Self {
        self.rules.insert(pattern.into(), config);
        self
    }

    pub fn verboseness(mut self, level: Verboseness) -> Self {
        self.verboseness = Some(level);
        self
    }

    pub fn enforce_parallel(mut self, parallel: bool) -> Self {
        self.enforce_parallel = Some(parallel);
        self
    }
}

fn expand_path(raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| ConfigError::new(format!("cannot expand config path '{raw}': {e}")))
}

impl RulebookConfig {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Build a config with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge the config file overlay (if any)
    /// 3. Merge the caller-supplied overlay
    pub fn layered(file: Option<PartialRulebookConfig>, caller: PartialRulebookConfig) -> Self {
        let mut config = Self::default_config();
        if let Some(file) = file {
            config.apply_overlay(file);
        }
        config.apply_overlay(caller);
        config
    }

    /// Location of the per-user config file, if one exists.
    pub fn user_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        let path = Path::new(&home).join(".config/rulebook/config.toml");
        path.exists().then_some(path)
    }

    /// Apply an overlay on top of this config (merge semantics).
    pub fn apply_overlay(&mut self, overlay: PartialRulebookConfig) {
        // Scalars override
        if let Some(v) = overlay.verboseness {
            self.verboseness = v;
        }
        if let Some(v) = overlay.enforce_parallel {
            self.enforce_parallel = v;
        }

        let s = overlay.severity;
        for (slot, v) in [
            (&mut self.severity.must, s.must),
            (&mut self.severity.should, s.should),
            (&mut self.severity.may, s.may),
            (&mut self.severity.optional, s.optional),
        ] {
            if v.is_some() {
                *slot = v;
            }
        }

        // Rules: new values win, existing values stay as defaults
        for (pattern, mut config) in overlay.rules {
            if let Some(existing) = self.rules.get(&pattern) {
                defaults_deep(&mut config, existing);
            }
            self.rules.insert(pattern, config);
        }
    }

    /// The generic part of the config, without any rule entries.
    pub fn generic(&self) -> Self {
        Self {
            rules: IndexMap::new(),
            ..self.clone()
        }
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay = PartialRulebookConfig::from_toml_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
