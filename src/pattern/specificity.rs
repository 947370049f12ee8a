use std::fmt;

use serde::Serialize;

/// How specific a name pattern is. More literal segments score higher.
///
/// Only the ordering is meaningful. Distinct patterns may compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Specificity(u32);

impl Specificity {
    /// Lower than any real pattern. Carried by the fallback rule config.
    pub const NONE: Specificity = Specificity(0);
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Glob syntax never delimits segments.
fn is_delimiter(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '?' | '!' | '(' | ')' | '[' | ']'))
}

/// Score a name pattern by counting its delimited segments.
///
/// A delimiter directly followed by `*` is not a boundary, so `foo-*` scores
/// the same as `foo`. A delimiter followed by `?` still counts.
pub fn specificity(pattern: &str) -> Specificity {
    let mut chars = pattern.chars().peekable();
    let mut segments = 1;
    while let Some(c) = chars.next() {
        if is_delimiter(c) && chars.peek() != Some(&'*') {
            segments += 1;
        }
    }
    Specificity(segments)
}
