//! rulebook: named, configurable rules enforced against arbitrary input.
//!
//! Rules are registered in a [`Rulebook`] under hierarchical names such as
//! `string/format/date`. Configuration is keyed by glob patterns over those
//! names; the most specific matching pattern decides a rule's effective
//! config, with less specific patterns filling in defaults. A rule's
//! `required` level maps to the action taken when it breaks: an error, a
//! warning, an info message or nothing at all.
//!
//! # Architecture
//!
//! - **[`config`]**: Configuration types, embedded defaults and overlay merge.
//! - **[`pattern`]**: Glob name patterns and their specificity score.
//! - **[`resolve`]**: The specificity cascade from patterns to per-rule config.
//! - **[`rule`]**: The rule handle and its enable, enforce, pass/fail pipeline.
//! - **[`rulebook`]**: The rule collection: add, select and enforce.
//! - **[`error`]**: Config, rule and rulebook errors.
//! - **[`logging`]**: Terminal logger setup for binaries and tests.

/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Error types.
pub mod error;
/// Terminal logger setup.
pub mod logging;
/// Name patterns and specificity scoring.
pub mod pattern;
/// Configuration cascade and lookup.
pub mod resolve;
/// Rules and their enforcement pipeline.
pub mod rule;
/// The rule collection.
pub mod rulebook;

pub use config::{Action, PartialRulebookConfig, Required, RuleConfig, RulebookConfig};
pub use error::{ConfigError, Error, Result, RuleError, RulebookError};
pub use rule::{Event, Failure, Outcome, Rule, Scope};
pub use rulebook::Rulebook;
