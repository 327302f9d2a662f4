//! Markdown-flavored text to HTML conversion.
//!
//! The whole input is escaped first; every recognizer below works on escaped
//! text and only ever inserts markup it generates itself.

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Opens and closes a protected inline code span while other inline rules run
const CODE_SPAN_OPEN: char = '\u{E000}';
const CODE_SPAN_CLOSE: char = '\u{E001}';

struct InlinePatterns {
    checkbox: Regex,
    code: Regex,
    bold_italic_star: Regex,
    bold_italic_underscore: Regex,
    bold_star: Regex,
    bold_underscore: Regex,
    italic_star: Regex,
    italic_underscore: Regex,
    strikethrough: Regex,
    image: Regex,
    link: Regex,
    code_restore: Regex,
}

struct BlockPatterns {
    list_item: Regex,
    header: Regex,
}

fn inline_patterns() -> &'static InlinePatterns {
    static PATTERNS: OnceLock<InlinePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| InlinePatterns {
        checkbox: Regex::new(r"\[([ xX])\](\s|$)").expect("valid checkbox regex"),
        code: Regex::new(r"`([^`]+)`").expect("valid code regex"),
        bold_italic_star: Regex::new(r"\*\*\*(.+?)\*\*\*").expect("valid regex"),
        bold_italic_underscore: Regex::new(r"___(.+?)___").expect("valid regex"),
        bold_star: Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"),
        bold_underscore: Regex::new(r"__(.+?)__").expect("valid regex"),
        italic_star: Regex::new(r"\*([^*\s][^*]*?)\*").expect("valid regex"),
        italic_underscore: Regex::new(r"(^|[^A-Za-z0-9_])_([^_\s][^_]*?)_($|[^A-Za-z0-9_])")
            .expect("valid regex"),
        strikethrough: Regex::new(r"~~(.+?)~~").expect("valid regex"),
        image: Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("valid image regex"),
        link: Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid link regex"),
        code_restore: Regex::new("\u{E000}([0-9]+)\u{E001}").expect("valid regex"),
    })
}

fn block_patterns() -> &'static BlockPatterns {
    static PATTERNS: OnceLock<BlockPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| BlockPatterns {
        list_item: Regex::new(r"^(\s*)([-*+]|\d+\.)\s+(.*)$").expect("valid list regex"),
        header: Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid header regex"),
    })
}

/// Convert a block of markdown-flavored text into HTML.
///
/// Pure: the same input always yields byte-identical output.
pub fn format_markdown(source: &str) -> String {
    // Attribute-safe so link targets can be placed inside quoted attributes
    let escaped = html_escape::encode_double_quoted_attribute(source);
    let lines: Vec<&str> = escaped.split('\n').collect();
    let mut out = HtmlJoiner::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() {
            out.blank_line();
            i += 1;
            continue;
        }

        if count_pipes(line) >= 2 {
            let end = table_extent(&lines, i);
            if end - i >= 2 {
                out.block(&render_table(&lines[i..end]));
            } else {
                out.inline(trimmed);
            }
            i = end.max(i + 1);
            continue;
        }

        if is_horizontal_rule(trimmed) {
            out.block("<hr>");
            i += 1;
            continue;
        }

        if let Some(caps) = block_patterns().header.captures(trimmed) {
            let level = caps[1].len();
            out.block(&format!(
                "<h{level}>{}</h{level}>",
                format_inline(caps[2].trim())
            ));
            i += 1;
            continue;
        }

        if trimmed.starts_with("&gt;") {
            let mut quoted = Vec::new();
            while i < lines.len() && lines[i].trim().starts_with("&gt;") {
                let content = lines[i].trim()["&gt;".len()..].trim_end_matches('\r');
                let content = content.strip_prefix(' ').unwrap_or(content);
                quoted.push(format_inline(content));
                i += 1;
            }
            out.block(&format!("<blockquote>{}</blockquote>", quoted.join("<br>")));
            continue;
        }

        if block_patterns().list_item.is_match(line) {
            let mut items = Vec::new();
            while i < lines.len() {
                let candidate = lines[i].trim_end_matches('\r');
                match block_patterns().list_item.captures(candidate) {
                    Some(caps) => {
                        items.push(ListItem {
                            indent: indent_width(&caps[1]),
                            ordered: caps[2].ends_with('.'),
                            content: caps[3].to_string(),
                            level: 0,
                        });
                        i += 1;
                    }
                    None => break,
                }
            }
            assign_levels(&mut items);
            let (html, _) = render_list(&items, 0, 0);
            out.block(&html);
            continue;
        }

        out.inline(&format_inline(trimmed));
        i += 1;
    }

    out.finish()
}

/// Tracks what was emitted last so separators only appear between inline chunks
#[derive(Default)]
struct HtmlJoiner {
    html: String,
    last: Option<Chunk>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Block,
    Inline,
    /// Inline chunk followed by at least one blank line
    InlineThenBlank,
}

impl HtmlJoiner {
    fn block(&mut self, html: &str) {
        self.html.push_str(html);
        self.last = Some(Chunk::Block);
    }

    fn inline(&mut self, html: &str) {
        match self.last {
            Some(Chunk::Inline) => self.html.push_str("<br>"),
            Some(Chunk::InlineThenBlank) => self.html.push_str("<br><br>"),
            _ => {}
        }
        self.html.push_str(html);
        self.last = Some(Chunk::Inline);
    }

    fn blank_line(&mut self) {
        if self.last == Some(Chunk::Inline) {
            self.last = Some(Chunk::InlineThenBlank);
        }
    }

    fn finish(self) -> String {
        self.html
    }
}

fn count_pipes(line: &str) -> usize {
    line.chars().filter(|c| *c == '|').count()
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c.is_whitespace() || matches!(c, '|' | ':' | '-'))
}

/// Index one past the last line belonging to a table starting at `start`
fn table_extent(lines: &[&str], start: usize) -> usize {
    let mut end = start;
    while end < lines.len() {
        let line = lines[end].trim_end_matches('\r');
        if count_pipes(line) >= 2 || (end > start && is_table_separator(line)) {
            end += 1;
        } else {
            break;
        }
    }
    end
}

fn table_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed
        .split('|')
        .map(|cell| format_inline(cell.trim()))
        .collect()
}

fn render_table(rows: &[&str]) -> String {
    let mut html = String::from("<table><thead><tr>");
    for cell in table_cells(rows[0]) {
        html.push_str(&format!("<th>{cell}</th>"));
    }
    html.push_str("</tr></thead><tbody>");

    let body_start = if rows.len() > 1 && is_table_separator(rows[1]) {
        2
    } else {
        1
    };
    for row in &rows[body_start..] {
        html.push_str("<tr>");
        for cell in table_cells(row) {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn is_horizontal_rule(trimmed: &str) -> bool {
    let compact: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && matches!(compact[0], '-' | '*' | '_')
        && compact.iter().all(|c| *c == compact[0])
}

fn indent_width(indent: &str) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

#[derive(Debug)]
struct ListItem {
    indent: usize,
    ordered: bool,
    content: String,
    level: usize,
}

/// Normalize raw indentation into nesting levels.
///
/// The smallest indent is level 0 and the smallest positive difference to it is
/// one level. Levels never jump by more than one from the previous item.
fn assign_levels(items: &mut [ListItem]) {
    let Some(base) = items.iter().map(|item| item.indent).min() else {
        return;
    };
    let step = items
        .iter()
        .map(|item| item.indent - base)
        .filter(|delta| *delta > 0)
        .min()
        .unwrap_or(1);

    let mut previous: Option<usize> = None;
    for item in items.iter_mut() {
        let raw = (item.indent - base) / step;
        item.level = match previous {
            None => 0,
            Some(prev) => raw.min(prev + 1),
        };
        previous = Some(item.level);
    }
}

/// Render items from `start` that sit at `level` or deeper, returning the next unconsumed index
fn render_list(items: &[ListItem], start: usize, level: usize) -> (String, usize) {
    let tag = if items[start].ordered { "ol" } else { "ul" };
    let mut html = format!("<{tag}>");
    let mut index = start;

    while index < items.len() && items[index].level == level {
        html.push_str("<li>");
        html.push_str(&format_inline(items[index].content.trim()));
        index += 1;

        if index < items.len() && items[index].level > level {
            let (nested, next) = render_list(items, index, items[index].level);
            html.push_str(&nested);
            index = next;
        }
        html.push_str("</li>");
    }

    html.push_str(&format!("</{tag}>"));
    (html, index)
}

/// Only links to web, relative and anchor targets survive; everything else stays literal text
pub fn is_safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("data:image/")
    {
        return true;
    }
    // No scheme at all: relative path or anchor
    match lower.find(':') {
        None => true,
        Some(colon) => lower[..colon].contains('/') || lower[..colon].contains('#'),
    }
}

/// Apply inline rules to an already escaped line
pub fn format_inline(text: &str) -> String {
    let patterns = inline_patterns();

    let mut code_spans = Vec::new();
    let text = patterns.code.replace_all(text, |caps: &Captures| {
        code_spans.push(caps[1].to_string());
        format!("{CODE_SPAN_OPEN}{}{CODE_SPAN_CLOSE}", code_spans.len() - 1)
    });

    let text = patterns.checkbox.replace_all(&text, |caps: &Captures| {
        let checked = if &caps[1] == " " { "" } else { " checked" };
        format!(
            "<input type=\"checkbox\" disabled{checked}>{}",
            &caps[2]
        )
    });
    let text = patterns
        .bold_italic_star
        .replace_all(&text, "<strong><em>$1</em></strong>");
    let text = patterns
        .bold_italic_underscore
        .replace_all(&text, "<strong><em>$1</em></strong>");
    let text = patterns.bold_star.replace_all(&text, "<strong>$1</strong>");
    let text = patterns
        .bold_underscore
        .replace_all(&text, "<strong>$1</strong>");
    let text = patterns.italic_star.replace_all(&text, "<em>$1</em>");

    // Adjacent matches share their boundary character, so repeat until stable
    let mut text = text.into_owned();
    loop {
        let next = patterns
            .italic_underscore
            .replace_all(&text, "$1<em>$2</em>$3")
            .into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    let text = patterns.strikethrough.replace_all(&text, "<del>$1</del>");
    let text = patterns.image.replace_all(&text, |caps: &Captures| {
        if is_safe_url(&caps[2]) {
            format!(
                "<img src=\"{}\" alt=\"{}\" class=\"markdown-image\">",
                &caps[2], &caps[1]
            )
        } else {
            caps[0].to_string()
        }
    });
    let text = patterns.link.replace_all(&text, |caps: &Captures| {
        if is_safe_url(&caps[2]) {
            format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                &caps[2], &caps[1]
            )
        } else {
            caps[0].to_string()
        }
    });

    patterns
        .code_restore
        .replace_all(&text, |caps: &Captures| {
            let index: usize = caps[1].parse().unwrap_or(usize::MAX);
            match code_spans.get(index) {
                Some(code) => format!("<code>{code}</code>"),
                None => String::new(),
            }
        })
        .into_owned()
}
