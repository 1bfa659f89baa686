//! Line-level wikitext helpers shared by the jobs. Nothing here parses
//! markup; these are the textual conventions the bot relies on.

use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

use crate::store::{NS_CATEGORY, NS_MAIN, NS_TEMPLATE};

const NAMESPACES: &[(&str, i32)] = &[
    ("Talk", 1),
    ("User", 2),
    ("User talk", 3),
    ("Project", 4),
    ("Project talk", 5),
    ("File", 6),
    ("Image", 6),
    ("File talk", 7),
    ("MediaWiki", 8),
    ("MediaWiki talk", 9),
    ("Template", NS_TEMPLATE),
    ("Template talk", 11),
    ("Help", 12),
    ("Help talk", 13),
    ("Category", NS_CATEGORY),
    ("Category talk", 15),
    ("Module", 828),
    ("Module talk", 829),
];

pub fn normalize_title(title: &str) -> String {
    title
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `Prefix:Rest` when the prefix is a known namespace.
pub fn split_namespace(title: &str) -> (i32, &str) {
    if let Some((prefix, rest)) = title.split_once(':') {
        let prefix = prefix.trim().replace('_', " ");
        for (name, id) in NAMESPACES {
            if name.eq_ignore_ascii_case(&prefix) {
                return (*id, rest.trim_start());
            }
        }
    }
    (NS_MAIN, title)
}

pub fn namespace_of(title: &str) -> i32 {
    split_namespace(title).0
}

fn namespace_name(id: i32) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(name, ns)| *ns == id && *name != "Image")
        .map(|(name, _)| *name)
}

/// Maps a subject page to its talk page. Talk pages map to themselves.
pub fn talk_title_for(subject_title: &str) -> String {
    let (namespace, base) = split_namespace(subject_title);
    if namespace % 2 == 1 {
        return normalize_title(subject_title);
    }
    let talk_name = namespace_name(namespace + 1).unwrap_or("Talk");
    format!("{talk_name}:{}", normalize_title(base))
}

/// Inverse of `talk_title_for`. Subject pages map to themselves.
pub fn subject_title_for(title: &str) -> String {
    let (namespace, base) = split_namespace(title);
    if namespace % 2 == 0 {
        return normalize_title(title);
    }
    match namespace_name(namespace - 1) {
        Some(name) => format!("{name}:{}", normalize_title(base)),
        None => normalize_title(base),
    }
}

/// `Q123`-style mainspace pages mirror knowledge-base items.
pub fn is_qid_page(title: &str) -> bool {
    title
        .trim()
        .strip_prefix('Q')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()))
}

pub fn category_title(name: &str) -> String {
    let name = normalize_title(name);
    match split_namespace(&name) {
        (NS_CATEGORY, rest) => format!("Category:{rest}"),
        _ => format!("Category:{name}"),
    }
}

/// Strips a leading `Category:` if present.
pub fn category_name(title: &str) -> String {
    match split_namespace(title) {
        (NS_CATEGORY, rest) => normalize_title(rest),
        _ => normalize_title(title),
    }
}

/// Returns `(is_redirect, target)`.
pub fn parse_redirect(content: &str) -> (bool, Option<String>) {
    let trimmed = content.trim();
    if !trimmed.to_ascii_uppercase().starts_with("#REDIRECT") {
        return (false, None);
    }
    if let Some(start) = trimmed.find("[[")
        && let Some(end) = trimmed[start + 2..].find("]]")
    {
        let target = trimmed[start + 2..start + 2 + end].trim().to_string();
        if !target.is_empty() {
            return (true, Some(target));
        }
    }
    (true, None)
}

/// Regex matching one `[[Category:NAME]]` or `[[Category:NAME|sortkey]]`
/// tag. The first letter is case-insensitive and spaces match underscores,
/// following MediaWiki title rules. Capture 1 is the `|sortkey` part.
pub fn category_tag_regex(name: &str) -> Result<Regex> {
    let name = category_name(name);
    let mut pattern = String::from(r"\[\[\s*[Cc]ategory\s*:\s*");
    for (index, ch) in name.chars().enumerate() {
        if ch == ' ' {
            pattern.push_str("[ _]+");
        } else if index == 0 && ch.to_lowercase().ne(ch.to_uppercase()) {
            pattern.push('[');
            for variant in ch.to_uppercase().chain(ch.to_lowercase()) {
                pattern.push_str(&regex::escape(&variant.to_string()));
            }
            pattern.push(']');
        } else {
            pattern.push_str(&regex::escape(&ch.to_string()));
        }
    }
    pattern.push_str(r"\s*(\|[^\]]*)?\]\]");
    Regex::new(&pattern).with_context(|| format!("failed to build category pattern for {name}"))
}

/// Top-level `{{...}}` blocks in document order, trimmed and deduplicated.
pub fn extract_top_level_templates(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut templates = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut index = 0usize;

    while index < bytes.len() {
        if bytes[index..].starts_with(b"{{") {
            if depth == 0 {
                start = Some(index);
            }
            depth += 1;
            index += 2;
            continue;
        }
        if depth > 0 && bytes[index..].starts_with(b"}}") {
            depth -= 1;
            index += 2;
            if depth == 0
                && let Some(begin) = start.take()
            {
                let block = text[begin..index].trim();
                if !block.is_empty() {
                    templates.push(block.to_string());
                }
            }
            continue;
        }
        index += 1;
    }

    dedupe_preserve_order(templates)
}

pub fn dedupe_preserve_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.trim().to_string();
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

/// True if any character is a CJK ideograph or kana.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|ch| {
        matches!(
            u32::from(ch),
            0x3040..=0x309F | 0x30A0..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF
        )
    })
}
