//! Thinking-tag vocabulary.
//!
//! Model output is inconsistent about which closing tag ends a seed thinking
//! span, so all three observed variants are accepted. A closing tag that is
//! followed by another closing tag before any opening tag is a premature close
//! (`<think>A</think>B</think>`) and does not end the span.

pub const THINK_OPEN: &str = "<think>";
pub const SEED_THINK_OPEN: &str = "<seed:think>";
pub const THINK_CLOSE: &str = "</think>";
pub const SEED_THINK_CLOSE: &str = "</seed:think>";
pub const SEED_BUDGET_REFLECT_CLOSE: &str = "</seed:cot_budget_reflect>";
pub const CODE_FENCE: &str = "```";

pub const THINK_OPENERS: [&str; 2] = [THINK_OPEN, SEED_THINK_OPEN];
const STANDARD_CLOSERS: [&str; 1] = [THINK_CLOSE];
const SEED_CLOSERS: [&str; 3] = [SEED_THINK_CLOSE, THINK_CLOSE, SEED_BUDGET_REFLECT_CLOSE];
pub const ALL_THINK_CLOSERS: [&str; 3] = SEED_CLOSERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThinkKind {
    /// `<think>…</think>`
    Standard,
    /// `<seed:think>…</seed:think>` and its alternate terminators
    Seed,
}

impl ThinkKind {
    pub fn from_opener(opener: &str) -> Self {
        if opener == SEED_THINK_OPEN {
            ThinkKind::Seed
        } else {
            ThinkKind::Standard
        }
    }

    /// Tags accepted as the end of a span of this kind
    pub fn closers(&self) -> &'static [&'static str] {
        match self {
            ThinkKind::Standard => &STANDARD_CLOSERS,
            ThinkKind::Seed => &SEED_CLOSERS,
        }
    }

    pub fn title(&self, step: u64) -> String {
        match self {
            ThinkKind::Standard => format!("Think (Step {step})"),
            ThinkKind::Seed => format!("Seed Think (Step {step})"),
        }
    }
}

/// Earliest occurrence of any needle: (position, needle index)
pub fn find_earliest(haystack: &str, needles: &[&str]) -> Option<(usize, usize)> {
    needles
        .iter()
        .enumerate()
        .filter_map(|(index, needle)| haystack.find(needle).map(|position| (position, index)))
        .min()
}

/// Whether a closing tag followed by `after` is a premature close
pub fn is_premature_close(after: &str, kind: ThinkKind) -> bool {
    let next_close = find_earliest(after, kind.closers()).map(|(position, _)| position);
    let next_open = find_earliest(after, &THINK_OPENERS).map(|(position, _)| position);
    match (next_close, next_open) {
        (Some(close), Some(open)) => close < open,
        (Some(_), None) => true,
        _ => false,
    }
}
