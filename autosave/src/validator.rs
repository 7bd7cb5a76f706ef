//! Screenplay markup validation.
//!
//! A document is a sequence of tag-delimited screenplay elements. Plain
//! text with no markup at all is accepted too; the formatter wraps it before
//! it reaches the server. Markup made only of unknown elements is treated as
//! corrupted or foreign and never persisted.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Element names the screenplay grammar recognizes.
pub const SCREENPLAY_TAGS: &[&str] = &[
    "header",
    "action",
    "speaker",
    "dialog",
    "directions",
    "chapter-break",
];

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_regex() -> &'static Regex {
    TAG_RE.get_or_init(|| {
        Regex::new(r"<\s*(/)?\s*([A-Za-z][A-Za-z0-9_-]*)\b[^<>]*?(/)?\s*>")
            .unwrap_or_else(|e| panic!("invalid screenplay tag pattern: {e}"))
    })
}

/// Coarse classification of document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Empty or whitespace only
    Empty,
    /// Non-empty text with no markup
    PlainText,
    /// At least one complete recognized element
    Screenplay,
    /// Markup present, but no complete recognized element
    Foreign,
}

impl ContentKind {
    pub fn is_valid(&self) -> bool {
        matches!(self, ContentKind::PlainText | ContentKind::Screenplay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Empty => "empty",
            ContentKind::PlainText => "plain_text",
            ContentKind::Screenplay => "screenplay",
            ContentKind::Foreign => "foreign",
        }
    }
}

fn is_recognized(name: &str) -> bool {
    SCREENPLAY_TAGS
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(name))
}

pub fn classify(content: &str) -> ContentKind {
    if content.trim().is_empty() {
        return ContentKind::Empty;
    }

    let mut saw_tag = false;
    let mut opened: HashSet<String> = HashSet::new();

    for caps in tag_regex().captures_iter(content) {
        saw_tag = true;
        let Some(name) = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) else {
            continue;
        };
        if !is_recognized(&name) {
            continue;
        }

        let closing = caps.get(1).is_some();
        let self_closing = caps.get(3).is_some();
        if self_closing || (closing && opened.contains(&name)) {
            return ContentKind::Screenplay;
        }
        if !closing {
            opened.insert(name);
        }
    }

    if saw_tag {
        ContentKind::Foreign
    } else {
        ContentKind::PlainText
    }
}

/// Returns true when `content` may be persisted.
pub fn validate(content: &str) -> bool {
    classify(content).is_valid()
}
