use anyhow::{Context, Result};
use regex::Regex;

use crate::store::NS_CATEGORY;
use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};
use crate::worklist::Worklist;

pub const JOB_NAME: &str = "strip-legacy-templates";

const LEGACY_PATTERNS: &[&str] = &[
    r"\{\{\s*デフォルトソート\s*:[^{}]*\}\}\n?",
    r"\{\{\s*[Cc]itation\s+[Nn]eeded\s*(?:\|[^{}]*)?\}\}\n?",
];

/// Removes import artifacts left on category pages by the Japanese wiki
/// import: `{{デフォルトソート:...}}` and `{{citation needed}}`.
#[derive(Debug)]
pub struct StripLegacyTemplates {
    patterns: Vec<Regex>,
}

impl StripLegacyTemplates {
    pub fn new() -> Result<Self> {
        let patterns = LEGACY_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile legacy template pattern {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn worklist() -> Worklist {
        Worklist::namespace(NS_CATEGORY, false)
    }

    pub fn strip(&self, text: &str) -> String {
        self.patterns
            .iter()
            .fold(text.to_string(), |current, pattern| {
                pattern.replace_all(&current, "").into_owned()
            })
    }
}

impl Transform for StripLegacyTemplates {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary(
            "Bot: remove legacy category-page templates ({{デフォルトソート}}, {{citation needed}})",
            run_tag,
        )
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        if input.page.namespace != NS_CATEGORY {
            return Ok(TransformOutcome::Skip("not a category page".to_string()));
        }
        if input.page.is_redirect {
            return Ok(TransformOutcome::Skip("redirect".to_string()));
        }
        let stripped = self.strip(&input.page.text);
        if stripped == input.page.text {
            return Ok(TransformOutcome::Unchanged);
        }
        Ok(TransformOutcome::Rewrite(stripped))
    }
}
