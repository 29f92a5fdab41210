//! Markdown helpers for lessonforge.
//!
//! Renders lesson documents from topic records (see [`ContentRenderer`]) and
//! reads metadata back out of rendered Markdown.

mod render;

use std::sync::LazyLock;

use regex::Regex;

pub use render::{ContentRenderer, LessonTemplate, complexity_label};

/// Text of the first top-level heading (`# Title`), trimmed.
pub fn extract_title(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+)$").expect("valid regex"));

    H1_RE
        .captures(md)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Count words outside fenced code blocks.
pub fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE
        .replace_all(md, "")
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '-' || c == '*'))
        .count()
}
