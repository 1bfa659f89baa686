use std::collections::BTreeMap;

use anyhow::Result;

use crate::store::PageSnapshot;
use crate::worklist::WorkItem;

/// Everything a transform may look at. The runner fetches all of it before
/// calling `apply`, so implementations never touch the page store.
#[derive(Debug, Clone)]
pub struct TransformInput<'a> {
    pub item: &'a WorkItem,
    pub page: &'a PageSnapshot,
    pub related: &'a BTreeMap<String, PageSnapshot>,
}

impl TransformInput<'_> {
    pub fn related_page(&self, title: &str) -> Option<&PageSnapshot> {
        self.related.get(title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Rewrite(String),
    Unchanged,
    Skip(String),
    Delete(String),
}

pub trait Transform {
    /// Job name; also the ledger file stem.
    fn name(&self) -> &str;

    fn target_title(&self, item: &WorkItem) -> String {
        item.title.clone()
    }

    fn related_titles(&self, _item: &WorkItem) -> Vec<String> {
        Vec::new()
    }

    /// Whether a missing target page may be created.
    fn creates_pages(&self) -> bool {
        false
    }

    fn summary(&self, run_tag: Option<&str>) -> String;

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome>;
}

/// Appends ` (run tag: X)` to a base summary when a tag is set.
pub fn tagged_summary(base: &str, run_tag: Option<&str>) -> String {
    match run_tag.map(str::trim).filter(|tag| !tag.is_empty()) {
        Some(tag) => format!("{base} (run tag: {tag})"),
        None => base.to_string(),
    }
}

/// Canonical form used to decide whether a rewrite is a no-op: trailing
/// whitespace on each line and trailing blank lines are ignored.
pub fn normalize_whitespace(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let lines = normalized
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>();
    lines.join("\n").trim_end().to_string()
}

pub fn is_same_text(current: &str, proposed: &str) -> bool {
    normalize_whitespace(current) == normalize_whitespace(proposed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_differences_are_not_edits() {
        assert!(is_same_text("Text  \nMore\n\n\n", "Text\nMore"));
        assert!(is_same_text("a\r\nb", "a\nb"));
        assert!(!is_same_text("  indented", "indented"));
        assert!(!is_same_text("a\n\nb", "a\nb"));
    }

    #[test]
    fn run_tag_is_appended_to_summary() {
        assert_eq!(
            tagged_summary("Bot: tidy", Some("2026-10-18")),
            "Bot: tidy (run tag: 2026-10-18)"
        );
        assert_eq!(tagged_summary("Bot: tidy", Some("  ")), "Bot: tidy");
        assert_eq!(tagged_summary("Bot: tidy", None), "Bot: tidy");
    }
}
