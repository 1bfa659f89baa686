//! Jobs that edit `[[Category:...]]` tags on member pages.

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};

use crate::transform::{Transform, TransformInput, TransformOutcome, tagged_summary};
use crate::wikitext::{category_name, category_tag_regex, category_title, contains_cjk};
use crate::worklist::{Worklist, WorklistSource};

pub const REMOVE_JOB_NAME: &str = "remove-category";
pub const MERGE_JOB_NAME: &str = "merge-category";

const TAG_NOT_FOUND: &str = "category tag not found";

/// The tag pattern plus the newline that ends its line, if any.
fn tag_line_regex(name: &str) -> Result<Regex> {
    let tag = category_tag_regex(name)?;
    Regex::new(&format!(r"{}\n?", tag.as_str()))
        .with_context(|| format!("failed to build category line pattern for {name}"))
}

/// Drops one category from every member page.
#[derive(Debug)]
pub struct RemoveCategory {
    name: String,
    tag_line: Regex,
}

impl RemoveCategory {
    pub fn new(name: &str) -> Result<Self> {
        let name = category_name(name);
        if name.is_empty() {
            bail!("--category must name a category");
        }
        Ok(Self {
            tag_line: tag_line_regex(&name)?,
            name,
        })
    }

    pub fn worklist(&self) -> Worklist {
        Worklist::category(&self.name, None)
    }
}

impl Transform for RemoveCategory {
    fn name(&self) -> &str {
        REMOVE_JOB_NAME
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary(
            &format!("Bot: remove [[{}]]", category_title(&self.name)),
            run_tag,
        )
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        let text = &input.page.text;
        if !self.tag_line.is_match(text) {
            return Ok(TransformOutcome::Skip(TAG_NOT_FOUND.to_string()));
        }
        Ok(TransformOutcome::Rewrite(
            self.tag_line.replace_all(text, "").into_owned(),
        ))
    }
}

/// Moves every member of category `from` into `to`, keeping sort keys, then
/// turns the `from` category page into a redirect.
#[derive(Debug)]
pub struct MergeCategory {
    from: String,
    to: String,
    from_tag: Regex,
    to_tag_line: Regex,
}

impl MergeCategory {
    pub fn new(from: &str, to: &str) -> Result<Self> {
        let from = category_name(from);
        let to = category_name(to);
        if from.is_empty() || to.is_empty() {
            bail!("--from and --to must both name a category");
        }
        if from == to {
            bail!("cannot merge [[{}]] into itself", category_title(&from));
        }
        if contains_cjk(&to) {
            bail!(
                "merge target [[{}]] is Japanese-named; merge into the English category instead",
                category_title(&to)
            );
        }
        Ok(Self {
            from_tag: category_tag_regex(&from)?,
            to_tag_line: tag_line_regex(&to)?,
            from,
            to,
        })
    }

    pub fn source_title(&self) -> String {
        category_title(&self.from)
    }

    pub fn target_title(&self) -> String {
        category_title(&self.to)
    }

    /// Members of the source category, then the source category page.
    pub fn worklist(&self) -> Worklist {
        Worklist::new(vec![
            WorklistSource::Category {
                title: self.source_title(),
                namespace: None,
            },
            WorklistSource::Explicit(vec![self.source_title()]),
        ])
    }

    fn retag(&self, text: &str) -> String {
        let target = self.target_title();
        let retagged = self.from_tag.replace_all(text, |captures: &Captures<'_>| {
            let sort_key = captures.get(1).map_or("", |sort_key| sort_key.as_str());
            format!("[[{target}{sort_key}]]")
        });

        let mut kept = false;
        self.to_tag_line
            .replace_all(&retagged, |captures: &Captures<'_>| {
                if kept {
                    String::new()
                } else {
                    kept = true;
                    captures[0].to_string()
                }
            })
            .into_owned()
    }
}

impl Transform for MergeCategory {
    fn name(&self) -> &str {
        MERGE_JOB_NAME
    }

    fn summary(&self, run_tag: Option<&str>) -> String {
        tagged_summary(
            &format!(
                "Bot: recategorize [[{}]] → [[{}]]",
                self.source_title(),
                self.target_title()
            ),
            run_tag,
        )
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
        if input.item.title == self.source_title() {
            return Ok(TransformOutcome::Rewrite(format!(
                "#REDIRECT [[{}]]\n",
                self.target_title()
            )));
        }
        if !self.from_tag.is_match(&input.page.text) {
            return Ok(TransformOutcome::Skip(TAG_NOT_FOUND.to_string()));
        }
        Ok(TransformOutcome::Rewrite(self.retag(&input.page.text)))
    }
}
