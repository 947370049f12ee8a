//! Rule name patterns: glob matching and specificity scoring.
//!
//! Patterns are globs over rule names. `*` matches within one `/`-separated
//! level, `**` crosses levels, `?` matches one character, `[..]` and `{a,b}`
//! work as usual. A leading `!` negates the whole pattern.

/// Specificity scoring for name patterns.
pub mod specificity;

pub use specificity::{Specificity, specificity};

use globset::{GlobBuilder, GlobMatcher};

use crate::error::RulebookError;

/// A compiled rule name pattern.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    matcher: GlobMatcher,
    negated: bool,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, RulebookError> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let glob = GlobBuilder::new(body)
            .literal_separator(true)
            .build()
            .map_err(|source| RulebookError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
            negated,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matcher.is_match(name) != self.negated
    }

    /// The pattern matching exactly the names this one does not.
    pub fn negate(&self) -> Self {
        let source = match self.source.strip_prefix('!') {
            Some(rest) => rest.to_string(),
            None => format!("!{}", self.source),
        };
        Self {
            source,
            matcher: self.matcher.clone(),
            negated: !self.negated,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Whether a string uses any glob syntax.
pub fn is_glob(pattern: &str) -> bool {
    pattern.starts_with('!') || pattern.contains(['*', '?', '[', ']', '{', '}'])
}
