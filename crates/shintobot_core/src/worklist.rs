use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::store::{EnumerateOutcome, EnumerateRequest, EnumerateScope, PageStore};
use crate::wikitext::{category_title, dedupe_preserve_order, namespace_of, normalize_title};

/// One page targeted by a job. The normalized title is the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub title: String,
    pub namespace: i32,
}

impl WorkItem {
    pub fn new(title: &str) -> Self {
        let title = normalize_title(title);
        let namespace = namespace_of(&title);
        Self { title, namespace }
    }

    pub fn id(&self) -> &str {
        &self.title
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorklistSource {
    Explicit(Vec<String>),
    Namespace { id: i32, include_redirects: bool },
    Category { title: String, namespace: Option<i32> },
}

/// Maps an enumerated title to the item title, or drops it.
pub type TitleMapper = fn(&str) -> Option<String>;

/// Result of pulling from a worklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Item(WorkItem),
    /// A listing request was throttled or failed transiently. Pulling again
    /// repeats the same request.
    Throttled(String),
    Exhausted,
}

/// A remote listing in progress.
#[derive(Debug)]
struct Paging {
    request: EnumerateRequest,
    /// Present when every page must be fetched before slicing from the
    /// start marker.
    collected: Option<Vec<String>>,
}

/// Lazy, ordered producer of work items over one or more sources.
///
/// Remote listings are fetched one continuation page at a time as items are
/// pulled. A start marker is passed to the server as an inclusive lower
/// bound for namespace listings; other sources are materialized and sliced
/// from the marker, falling back to the full list if the marker is absent.
#[derive(Debug)]
pub struct Worklist {
    sources: VecDeque<WorklistSource>,
    marker: Option<String>,
    mapper: Option<TitleMapper>,
    pending: VecDeque<WorkItem>,
    paging: Option<Paging>,
    seen: HashSet<String>,
}

impl Worklist {
    pub fn new(sources: Vec<WorklistSource>) -> Self {
        Self {
            sources: sources.into(),
            marker: None,
            mapper: None,
            pending: VecDeque::new(),
            paging: None,
            seen: HashSet::new(),
        }
    }

    pub fn from_titles(titles: Vec<String>) -> Self {
        Self::new(vec![WorklistSource::Explicit(titles)])
    }

    /// Explicit titles forced into the Category namespace, so `Shrines`
    /// and `Category:Shrines` name the same item.
    pub fn from_category_titles(titles: Vec<String>) -> Self {
        Self::from_titles(titles).with_mapper(as_category_title)
    }

    pub fn namespace(id: i32, include_redirects: bool) -> Self {
        Self::new(vec![WorklistSource::Namespace {
            id,
            include_redirects,
        }])
    }

    pub fn category(name: &str, namespace: Option<i32>) -> Self {
        Self::new(vec![WorklistSource::Category {
            title: category_title(name),
            namespace,
        }])
    }

    pub fn starting_at(mut self, marker: Option<&str>) -> Self {
        self.marker = marker
            .map(normalize_title)
            .filter(|marker| !marker.is_empty());
        self
    }

    pub fn with_mapper(mut self, mapper: TitleMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Whether another pull could yield an item, answered without remote
    /// I/O. An outstanding listing continuation counts as more.
    pub fn may_have_more(&self) -> bool {
        self.pending.iter().any(|item| !self.seen.contains(item.id()))
            || self.paging.is_some()
            || !self.sources.is_empty()
    }

    /// Pulls the next item, issuing at most one enumeration request.
    pub fn next_item<S: PageStore + ?Sized>(&mut self, store: &mut S) -> Result<Pull> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                if self.seen.insert(item.id().to_string()) {
                    return Ok(Pull::Item(item));
                }
                continue;
            }

            if let Some(mut paging) = self.paging.take() {
                let outcome = store
                    .enumerate(&paging.request)
                    .with_context(|| format!("failed to enumerate {:?}", paging.request.scope))?;
                let batch = match outcome {
                    EnumerateOutcome::Batch(batch) => batch,
                    EnumerateOutcome::RateLimited => {
                        self.paging = Some(paging);
                        return Ok(Pull::Throttled("listing rate limited".to_string()));
                    }
                    EnumerateOutcome::Transient(detail) => {
                        self.paging = Some(paging);
                        return Ok(Pull::Throttled(detail));
                    }
                };
                debug!(titles = batch.titles.len(), "fetched worklist page");
                let titles = batch.titles.into_iter().map(|(title, _)| title);
                match &mut paging.collected {
                    Some(collected) => collected.extend(titles),
                    None => {
                        let items = self.map_titles(titles);
                        self.pending.extend(items);
                    }
                }
                match batch.next {
                    Some(next) => {
                        paging.request.continue_token = Some(next);
                        self.paging = Some(paging);
                    }
                    None => {
                        if let Some(collected) = paging.collected {
                            let items = self.map_titles(collected.into_iter());
                            let items = self.apply_marker(items);
                            self.pending.extend(items);
                        }
                    }
                }
                continue;
            }

            let Some(source) = self.sources.pop_front() else {
                return Ok(Pull::Exhausted);
            };
            self.begin(source);
        }
    }

    fn begin(&mut self, source: WorklistSource) {
        match source {
            WorklistSource::Explicit(titles) => {
                let items = self.map_titles(titles.into_iter());
                let items = self.apply_marker(items);
                self.pending.extend(items);
            }
            WorklistSource::Namespace {
                id,
                include_redirects,
            } => {
                self.paging = Some(Paging {
                    request: EnumerateRequest {
                        scope: EnumerateScope::Namespace {
                            id,
                            include_redirects,
                        },
                        start_from: self.marker.take(),
                        continue_token: None,
                    },
                    collected: None,
                });
            }
            WorklistSource::Category { title, namespace } => {
                self.paging = Some(Paging {
                    request: EnumerateRequest {
                        scope: EnumerateScope::Category { title, namespace },
                        start_from: None,
                        continue_token: None,
                    },
                    collected: self.marker.is_some().then(Vec::new),
                });
            }
        }
    }

    fn map_titles<I>(&self, titles: I) -> Vec<WorkItem>
    where
        I: Iterator<Item = String>,
    {
        titles
            .filter_map(|title| match self.mapper {
                Some(mapper) => mapper(&title),
                None => Some(title),
            })
            .map(|title| WorkItem::new(&title))
            .filter(|item| !item.title.is_empty())
            .collect()
    }

    /// Slices from the marker, which is consumed once found so later
    /// sources in a chain are taken whole.
    fn apply_marker(&mut self, items: Vec<WorkItem>) -> Vec<WorkItem> {
        let Some(marker) = self.marker.clone() else {
            return items;
        };
        let (items, found) = slice_from_marker(items, &marker);
        if found {
            self.marker = None;
        }
        items
    }
}

fn as_category_title(title: &str) -> Option<String> {
    let title = normalize_title(title);
    (!title.is_empty()).then(|| category_title(&title))
}

/// Returns the items from `marker` (inclusive) onward. If the marker is not
/// present the full list is returned along with `false`.
pub fn slice_from_marker(items: Vec<WorkItem>, marker: &str) -> (Vec<WorkItem>, bool) {
    let marker = normalize_title(marker);
    match items.iter().position(|item| item.id() == marker) {
        Some(index) => (items.into_iter().skip(index).collect(), true),
        None => {
            warn!(marker = %marker, "start marker not found; processing the full list");
            (items, false)
        }
    }
}

/// Splits a comma-separated `--titles` value.
pub fn parse_titles_arg(value: &str) -> Vec<String> {
    dedupe_preserve_order(
        value
            .split(',')
            .map(normalize_title)
            .filter(|title| !title.is_empty()),
    )
}

/// Reads one title per line; blank lines and `#` comments are ignored and
/// duplicates keep their first position.
pub fn parse_titles_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read titles file {}", path.display()))?;
    Ok(dedupe_preserve_order(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(normalize_title),
    ))
}
