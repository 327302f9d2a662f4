use super::tags::find_earliest;

/// Result of looking for a set of tokens in the unprocessed text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A complete token starts at `position`; `needle` indexes the token list
    Found { position: usize, needle: usize },
    /// The text from `position` to the end could still grow into a token
    Incomplete { position: usize },
    NoMatch,
}

/// Find the earliest complete token, or a trailing partial one that needs more input
pub fn scan(text: &str, needles: &[&str]) -> Scan {
    if let Some((position, needle)) = find_earliest(text, needles) {
        return Scan::Found { position, needle };
    }

    let longest = needles.iter().map(|n| n.len()).max().unwrap_or(0);
    let window_start = text.len().saturating_sub(longest.saturating_sub(1));
    for position in window_start..text.len() {
        if !text.is_char_boundary(position) {
            continue;
        }
        let suffix = &text[position..];
        if needles.iter().any(|needle| needle.starts_with(suffix)) {
            return Scan::Incomplete { position };
        }
    }

    Scan::NoMatch
}
