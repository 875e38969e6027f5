//! Markdown to Slack `mrkdwn` conversion.
//!
//! Outbound text is authored in plain Markdown; Slack renders its own
//! dialect. Fenced and inline code are left as written; everything else
//! gets the bold, italic, strike, heading, link, and rule rewrites below.

use std::sync::LazyLock;

use regex::Regex;

/// Line substituted for a Markdown horizontal rule.
pub const DIVIDER_LINE: &str = "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}";

/// Marks converted bold spans until italics have been rewritten.
const BOLD_MARK: char = '\u{1}';

/// Ordered inline rewrites applied outside code spans.
static INLINE_RULES: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    [
        (r"\[([^\]]+)\]\(([^)\s]+)\)", "<$2|$1>".to_owned()),
        (r"\*\*(.+?)\*\*", format!("{BOLD_MARK}$1{BOLD_MARK}")),
        (r"__(.+?)__", format!("{BOLD_MARK}$1{BOLD_MARK}")),
        (r"\*([^*\s](?:[^*]*[^*\s])?)\*", "_${1}_".to_owned()),
        (r"~~(.+?)~~", "~$1~".to_owned()),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| {
        Regex::new(pattern).ok().map(|regex| (regex, replacement))
    })
    .collect()
});

static HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*$").ok());

/// Convert Markdown to Slack `mrkdwn`.
#[must_use]
pub fn to_mrkdwn(markdown: &str) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            out.push(escape(line));
            continue;
        }
        if in_fence {
            out.push(escape(line));
            continue;
        }
        if is_rule(trimmed) {
            out.push(DIVIDER_LINE.to_owned());
            continue;
        }

        let heading = HEADING
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());
        match heading {
            Some(title) => {
                let body = convert_inline(&escape(title)).replace(BOLD_MARK, "");
                out.push(format!("*{body}*"));
            }
            None => out.push(convert_inline(&escape(line)).replace(BOLD_MARK, "*")),
        }
    }

    out.join("\n")
}

/// Escape the three characters Slack treats as control sequences.
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|c| line.chars().all(|ch| ch == *c))
}

/// Rewrite inline syntax, leaving backtick code spans untouched.
fn convert_inline(line: &str) -> String {
    line.split('`')
        .enumerate()
        .map(|(index, segment)| {
            if index % 2 == 1 {
                segment.to_owned()
            } else {
                INLINE_RULES
                    .iter()
                    .fold(segment.to_owned(), |text, (regex, replacement)| {
                        regex.replace_all(&text, replacement.as_str()).into_owned()
                    })
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}
