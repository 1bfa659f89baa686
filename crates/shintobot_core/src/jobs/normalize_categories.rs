use anyhow::{Context, Result};
use regex::Regex;

use crate::store::{NS_CATEGORY, NS_MAIN};
use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};
use crate::wikitext::{dedupe_preserve_order, extract_top_level_templates, split_namespace};
use crate::worklist::Worklist;

pub const JOB_NAME: &str = "normalize-categories";

const TEMPLATES_MARKER: &str = "<!--templates-->";
const INTERWIKIS_MARKER: &str = "<!--interwikis-->";
const CATEGORIES_MARKER: &str = "<!--categories-->";

/// Rebuilds category pages so they hold only templates, language links and
/// category links, each under its own comment marker.
#[derive(Debug)]
pub struct NormalizeCategories {
    include_redirects: bool,
    category_line: Regex,
    interwiki_line: Regex,
}

impl NormalizeCategories {
    /// With `include_redirects` category redirects are listed and rebuilt
    /// like any other category page.
    pub fn new(include_redirects: bool) -> Result<Self> {
        Ok(Self {
            include_redirects,
            category_line: Regex::new(r"(?i)^\s*\[\[\s*Category\s*:[^\]]+\]\]\s*$")
                .context("failed to compile category line pattern")?,
            interwiki_line: Regex::new(r"(?i)^\s*\[\[\s*([a-z][a-z0-9-]{1,15})\s*:[^\]]+\]\]\s*$")
                .context("failed to compile interwiki line pattern")?,
        })
    }

    pub fn worklist(&self) -> Worklist {
        Worklist::namespace(NS_CATEGORY, self.include_redirects)
    }

    pub fn normalized_text(&self, text: &str) -> String {
        let templates = extract_top_level_templates(text);
        let mut interwikis = Vec::new();
        let mut categories = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if self.category_line.is_match(line) {
                categories.push(line.to_string());
            } else if let Some(captures) = self.interwiki_line.captures(line)
                && let Some(prefix) = captures.get(1)
                && is_language_prefix(prefix.as_str())
            {
                interwikis.push(line.to_string());
            }
        }

        let mut lines = Vec::new();
        if let Some(redirect) = redirect_line(text) {
            lines.push(redirect.to_string());
        }
        lines.push(TEMPLATES_MARKER.to_string());
        lines.extend(templates);
        lines.push(INTERWIKIS_MARKER.to_string());
        lines.extend(dedupe_preserve_order(interwikis));
        lines.push(CATEGORIES_MARKER.to_string());
        lines.extend(dedupe_preserve_order(categories));
        format!("{}\n", lines.join("\n").trim_end())
    }
}

/// The `#REDIRECT` line of a redirect page, kept at the head when a
/// redirect is rebuilt.
fn redirect_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| line.to_ascii_lowercase().starts_with("#redirect"))
}

/// Local namespace links such as `[[File:...]]` share the interwiki shape.
fn is_language_prefix(prefix: &str) -> bool {
    let sample = format!("{prefix}:x");
    split_namespace(&sample).0 == NS_MAIN
}

impl Transform for NormalizeCategories {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary(
            "Bot: normalize category page to templates, interwikis and categories",
            run_tag,
        )
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        if input.page.namespace != NS_CATEGORY {
            return Ok(TransformOutcome::Skip("not a category page".to_string()));
        }
        if input.page.is_redirect && !self.include_redirects {
            return Ok(TransformOutcome::Skip("redirect".to_string()));
        }
        if input.page.text.trim().is_empty() {
            return Ok(TransformOutcome::Skip("empty page".to_string()));
        }
        Ok(TransformOutcome::Rewrite(
            self.normalized_text(&input.page.text),
        ))
    }
}
