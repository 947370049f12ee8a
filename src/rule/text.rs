use crate::error::RulebookError;

/// Rule names are restricted to ASCII letters, digits and `/.-_|@`.
pub fn validate_name(name: &str) -> Result<&str, RulebookError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '-' | '|' | '@'));
    if valid {
        Ok(name)
    } else {
        Err(RulebookError::InvalidName(name.to_string()))
    }
}

/// Tidy a free-form description: trim it, drop each line's indentation and
/// join lines that were soft-wrapped inside a paragraph.
pub fn normalize_description(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().map(str::trim_start).collect();
    let mut out = String::with_capacity(text.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(if soft_wrapped(lines[i - 1], line) { ' ' } else { '\n' });
        }
        out.push_str(line);
    }
    out
}

fn is_text_char(c: char) -> bool {
    c.is_ascii_alphabetic() || "\"',.:;".contains(c)
}

/// Whether `next` continues the sentence that `prev` ends with.
/// A line starting with a numbered-list marker (`1.`) starts a new line.
fn soft_wrapped(prev: &str, next: &str) -> bool {
    let Some(last) = prev.chars().last() else {
        return false;
    };
    if !(last.is_ascii_digit() || is_text_char(last)) {
        return false;
    }
    let Some(first) = next.chars().next() else {
        return false;
    };
    if is_text_char(first) {
        return true;
    }
    let digits = next.chars().take_while(char::is_ascii_digit).count();
    digits > 0
        && next
            .chars()
            .nth(digits)
            .is_some_and(|c| c != '.')
}
