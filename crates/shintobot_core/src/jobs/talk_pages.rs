//! Rebuilds talk pages into the standard layout: a header template, the
//! preserved local discussion, then the import section.

use anyhow::Result;

use crate::store::NS_MAIN;
use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};
use crate::wikitext::{is_qid_page, subject_title_for, talk_title_for};
use crate::worklist::{WorkItem, Worklist};

pub const JOB_NAME: &str = "migrate-talk";

pub const TALK_HEADER: &str = "{{talk page header}}";
const LAYERS_COMMENT: &str =
    "<!-- This talk page covers the main article and all associated namespace layers -->";
const LOCAL_HEADING: &str = "== Local discussion ==";
const LOCAL_PLACEHOLDER: &str = "<!-- Add local discussion below this line. -->";
const IMPORT_HEADING: &str = "== Initial import ==";
const NO_SOURCE_COMMENT: &str =
    "<!-- No source talk page found via linked QID sitelinks (ja/en/simple) at migration time. -->";

/// Signed on save, so only the prefix is stable across runs.
pub const DUMMY_PREFIX: &str =
    ":Dummy comment added by script to avoid immediate auto-archive of a fresh page.";
const SIGNATURE: &str = "~~~~";

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateTalk;

impl MigrateTalk {
    /// Subject pages to migrate: the given titles (talk titles are mapped to
    /// their subject) or every mainspace article.
    pub fn worklist(titles: Option<Vec<String>>) -> Worklist {
        let worklist = match titles {
            Some(titles) => Worklist::from_titles(titles),
            None => Worklist::namespace(NS_MAIN, false),
        };
        worklist.with_mapper(subject_item)
    }
}

/// Maps any title to its subject page, dropping knowledge-base mirror pages.
pub fn subject_item(title: &str) -> Option<String> {
    let subject = subject_title_for(title);
    (!is_qid_page(&subject)).then_some(subject)
}

impl Transform for MigrateTalk {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn target_title(&self, item: &WorkItem) -> String {
        talk_title_for(&item.title)
    }

    fn related_titles(&self, item: &WorkItem) -> Vec<String> {
        vec![item.title.clone()]
    }

    fn creates_pages(&self) -> bool {
        true
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary("Bot: migrate talk page to the standard layout", run_tag)
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        if is_qid_page(&input.item.title) {
            return Ok(TransformOutcome::Skip("Q-number page".to_string()));
        }
        match input.related_page(&input.item.title) {
            Some(subject) if subject.exists && subject.is_redirect => {
                return Ok(TransformOutcome::Skip("subject page is a redirect".to_string()));
            }
            Some(subject) if subject.exists => {}
            _ => return Ok(TransformOutcome::Skip("subject page does not exist".to_string())),
        }
        if input.page.is_redirect {
            return Ok(TransformOutcome::Skip("talk page is a redirect".to_string()));
        }
        Ok(TransformOutcome::Rewrite(build_talk_text(&input.page.text)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Preamble,
    Local,
    Import,
}

/// Existing talk text split into the local discussion body and any import
/// sections (headings included).
#[derive(Debug, Default, PartialEq, Eq)]
struct ExistingTalk {
    local: String,
    import: String,
}

fn split_existing(text: &str) -> ExistingTalk {
    let mut region = Region::Preamble;
    let mut local = Vec::new();
    let mut import = Vec::new();

    for line in text.lines() {
        match heading(line) {
            Some((2, title)) if title.eq_ignore_ascii_case("Local discussion") => {
                region = Region::Local;
                continue;
            }
            Some((2, title)) if is_import_heading(title) => region = Region::Import,
            _ => {}
        }
        match region {
            Region::Preamble if is_boilerplate(line) => {}
            Region::Preamble | Region::Local => local.push(line),
            Region::Import => import.push(line),
        }
    }

    ExistingTalk {
        local: local.join("\n").trim().to_string(),
        import: import.join("\n").trim().to_string(),
    }
}

fn is_import_heading(title: &str) -> bool {
    title.eq_ignore_ascii_case("Initial import")
        || title
            .get(..13)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("Imported from"))
}

fn is_boilerplate(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.eq_ignore_ascii_case(TALK_HEADER)
        || trimmed == LAYERS_COMMENT
        || trimmed.starts_with("<!-- Imported from Japanese/English")
}

/// `(level, title)` for a `== Title ==` line.
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    if !trimmed.starts_with('=') || !trimmed.ends_with('=') {
        return None;
    }
    let title = trimmed.trim_matches('=').trim();
    if title.is_empty() {
        return None;
    }
    let leading = trimmed.len() - trimmed.trim_start_matches('=').len();
    let trailing = trimmed.len() - trimmed.trim_end_matches('=').len();
    Some((leading.min(trailing), title))
}

pub fn build_talk_text(existing: &str) -> String {
    let existing = split_existing(existing);
    let mut parts = vec![TALK_HEADER, "", LAYERS_COMMENT, "", LOCAL_HEADING];
    if existing.local.is_empty() {
        parts.push(LOCAL_PLACEHOLDER);
    } else {
        parts.push(&existing.local);
    }
    parts.push("");
    if existing.import.is_empty() {
        parts.extend([IMPORT_HEADING, NO_SOURCE_COMMENT]);
    } else {
        parts.push(&existing.import);
    }
    let text = inject_dummy_at_section_ends(&parts.join("\n"));
    format!("{}\n", text.trim_end())
}

/// Ensures every heading-delimited section with content ends with the
/// anti-archive comment. Lines before the first heading are left alone.
pub fn inject_dummy_at_section_ends(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut section: Vec<String> = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        if heading(line).is_some() {
            if in_section {
                out.extend(with_dummy(std::mem::take(&mut section)));
            }
            out.push(line.to_string());
            in_section = true;
        } else if in_section {
            section.push(line.to_string());
        } else {
            out.push(line.to_string());
        }
    }
    if in_section {
        out.extend(with_dummy(section));
    }
    out.join("\n").trim_end().to_string()
}

fn with_dummy(mut section: Vec<String>) -> Vec<String> {
    let Some(last) = section.iter().rposition(|line| !line.trim().is_empty()) else {
        return section;
    };
    if !section[last].starts_with(DUMMY_PREFIX) {
        section.insert(last + 1, format!("{DUMMY_PREFIX}{SIGNATURE}"));
    }
    section
}
