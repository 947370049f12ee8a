//! Error taxonomy: configuration problems, failed rules, and rulebook misuse.

use std::path::Path;

use crate::config::{Action, Required};

/// A configuration value the rulebook cannot make sense of.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// A rule referenced a required level that has no severity mapping.
    pub fn unknown_required(rule: &str, found: &str) -> Self {
        let expected: Vec<String> = Required::ALL
            .iter()
            .map(|r| format!("'{}'", r.as_str()))
            .collect();
        Self::new(format!(
            "Found unknown required level '{found}' in the configuration for rule '{rule}'. \
             Expected one of [{}, null]",
            expected.join(", ")
        ))
    }

    /// Reading a configuration file failed.
    pub fn io(path: &Path, source: &std::io::Error) -> Self {
        Self::new(format!("cannot read config file {}: {source}", path.display()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::new(format!("config parse error: {e}"))
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("config parse error: {e}"))
    }
}

/// A specific rule was broken.
///
/// Carries the identity of the rule the failure is attributed to, the
/// severity it was raised with and the rendered failing values. An error
/// crossing an alias boundary is re-attributed to the alias, never wrapped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} {}", .required.label(), .message)]
pub struct RuleError {
    /// Name of the rule the failure is attributed to.
    pub rule: String,
    /// Required level the rule was configured with.
    pub required: Required,
    /// Action the required level resolved to.
    pub severity: Option<Action>,
    pub description: Option<String>,
    /// Failing values, each rendered as text.
    pub inputs: Vec<String>,
    pub message: String,
}

impl RuleError {
    pub fn new(
        rule: impl Into<String>,
        required: Required,
        severity: Option<Action>,
        description: Option<String>,
        inputs: Vec<String>,
    ) -> Self {
        let message = inputs.join("\n");
        Self {
            rule: rule.into(),
            required,
            severity,
            description,
            inputs,
            message,
        }
    }
}

/// Misuse of a rulebook: bad names, bad patterns, broken aliases.
#[derive(Debug, thiserror::Error)]
pub enum RulebookError {
    #[error("The rule named '{0}' already exists in the set. Rule names must be unique.")]
    Duplicate(String),

    #[error(
        "'{0}' is not a valid rule name. \
         Rule names are restricted to letters, numbers and the symbols /.-_|@"
    )]
    InvalidName(String),

    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Rule '{0}' is not part of a rulebook. Can't look for alias '{1}'")]
    Detached(String, String),

    #[error("Could not find alias rule named '{0}'")]
    AliasNotFound(String),

    #[error("Rule '{0}' cannot alias '{1}' because the alias chain loops back")]
    AliasCycle(String, String),
}

/// Any error surfaced by the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Rulebook(#[from] RulebookError),
}

impl Error {
    /// The rule failure, if this is one.
    pub fn as_rule_error(&self) -> Option<&RuleError> {
        match self {
            Error::Rule(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
