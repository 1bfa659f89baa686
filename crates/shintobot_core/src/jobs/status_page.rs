use anyhow::{Result, bail};

use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};
use crate::wikitext::normalize_title;
use crate::worklist::Worklist;

pub const JOB_NAME: &str = "update-status";

pub const START_MARKER: &str = "<!-- BOT-RUN-STATUS:START -->";
pub const END_MARKER: &str = "<!-- BOT-RUN-STATUS:END -->";

/// Rewrites the marked status block on the bot's user page.
///
/// The block is rebuilt from `base_template` when one is given, otherwise
/// from the page's current text, so hand-written content around the markers
/// survives.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    page: String,
    base_template: Option<String>,
    last_run: String,
    run_tag: Option<String>,
}

impl UpdateStatus {
    pub fn new(
        page: &str,
        base_template: Option<String>,
        last_run: &str,
        run_tag: Option<&str>,
    ) -> Result<Self> {
        let page = normalize_title(page);
        if page.is_empty() {
            bail!("--page must name the status page");
        }
        Ok(Self {
            page,
            base_template,
            last_run: last_run.to_string(),
            run_tag: run_tag
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(ToString::to_string),
        })
    }

    pub fn worklist(&self) -> Worklist {
        Worklist::from_titles(vec![self.page.clone()])
    }

    pub fn status_block(&self) -> String {
        let mut lines = vec![
            START_MARKER.to_string(),
            "== Bot run status ==".to_string(),
            format!("* Last run (UTC): {}", self.last_run),
        ];
        if let Some(tag) = &self.run_tag {
            lines.push(format!("* Run tag: {tag}"));
        }
        lines.push(END_MARKER.to_string());
        lines.join("\n")
    }
}

/// Replaces the marked block, or appends it when either marker is absent.
pub fn merge_status_block(base_text: &str, block: &str) -> String {
    let text = base_text.trim();
    if let Some((before, rest)) = text.split_once(START_MARKER)
        && let Some((_, after)) = rest.split_once(END_MARKER)
    {
        let merged = format!("{}\n\n{block}\n\n{}", before.trim_end(), after.trim_start());
        return format!("{}\n", merged.trim());
    }
    if text.is_empty() {
        return format!("{block}\n");
    }
    format!("{text}\n\n{block}\n")
}

impl Transform for UpdateStatus {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn creates_pages(&self) -> bool {
        true
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary("Bot: update run status", run_tag)
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        let base = self
            .base_template
            .as_deref()
            .unwrap_or(input.page.text.as_str());
        Ok(TransformOutcome::Rewrite(merge_status_block(
            base,
            &self.status_block(),
        )))
    }
}
