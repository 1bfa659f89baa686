use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, error, info, warn};

use crate::ledger::{LedgerStatus, ProgressLedger};
use crate::store::{DeleteOutcome, EditOutcome, EditRequest, PageSnapshot, PageStore};
use crate::throttle::{BackoffPolicy, Clock, RateLimiter};
use crate::transform::{
    Transform, TransformInput, TransformOutcome, is_same_text, tagged_summary,
};
use crate::worklist::{Pull, WorkItem, Worklist};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub apply: bool,
    /// Per-run cap on writes (or would-be writes in dry-run).
    pub max_edits: Option<usize>,
    pub run_tag: Option<String>,
    pub show_diff: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::Apply => "apply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditPreview {
    pub title: String,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub job: String,
    pub mode: RunMode,
    pub edited: usize,
    pub deleted: usize,
    pub would_edit: usize,
    /// Includes no-ops.
    pub skipped: usize,
    pub no_op: usize,
    pub already_done: usize,
    pub failed: Vec<FailedItem>,
    pub cap_reached: bool,
    /// Remote writes performed, including deletions.
    pub writes: usize,
    #[serde(skip)]
    pub previews: Vec<EditPreview>,
}

impl RunReport {
    fn new(job: &str, mode: RunMode) -> Self {
        Self {
            job: job.to_string(),
            mode,
            edited: 0,
            deleted: 0,
            would_edit: 0,
            skipped: 0,
            no_op: 0,
            already_done: 0,
            failed: Vec::new(),
            cap_reached: false,
            writes: 0,
            previews: Vec::new(),
        }
    }

    /// Edits counted against `max_edits`.
    pub fn capped_edits(&self) -> usize {
        match self.mode {
            RunMode::Apply => self.writes,
            RunMode::DryRun => self.would_edit,
        }
    }
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    Edited { text: String },
    Deleted,
    WouldEdit,
    WouldDelete,
    NoOp,
    Skipped(String),
    Failed(String),
}

/// Drives one job: pulls items, skips settled ones, applies the transform,
/// writes changed pages and records every outcome in the ledger.
pub struct BatchRunner<'a, S: PageStore + ?Sized, C: Clock + Clone> {
    store: &'a mut S,
    ledger: &'a mut ProgressLedger,
    limiter: RateLimiter<C>,
    backoff: BackoffPolicy,
    clock: C,
    options: RunOptions,
}

impl<'a, S: PageStore + ?Sized, C: Clock + Clone> BatchRunner<'a, S, C> {
    pub fn new(
        store: &'a mut S,
        ledger: &'a mut ProgressLedger,
        limiter: RateLimiter<C>,
        backoff: BackoffPolicy,
        clock: C,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            ledger,
            limiter,
            backoff,
            clock,
            options,
        }
    }

    pub fn run(&mut self, worklist: &mut Worklist, transform: &dyn Transform) -> Result<RunReport> {
        let mode = if self.options.apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        };
        let mut report = RunReport::new(transform.name(), mode);
        let settled = self.ledger.load()?;
        info!(
            job = transform.name(),
            mode = mode.as_str(),
            max_edits = ?self.options.max_edits,
            settled = settled.len(),
            ledger = %self.ledger.path().display(),
            "run started"
        );

        let mut listing_attempt = 0u32;
        loop {
            if self
                .options
                .max_edits
                .is_some_and(|cap| cap > 0 && report.capped_edits() >= cap)
            {
                report.cap_reached = worklist.may_have_more();
                if report.cap_reached {
                    info!("edit cap reached; stopping");
                }
                break;
            }
            let item = match worklist.next_item(&mut *self.store)? {
                Pull::Item(item) => {
                    listing_attempt = 0;
                    item
                }
                Pull::Throttled(reason) => {
                    self.back_off("worklist listing", listing_attempt, &reason);
                    listing_attempt = listing_attempt.saturating_add(1);
                    continue;
                }
                Pull::Exhausted => break,
            };

            if self.ledger.is_done(item.id()) {
                report.already_done += 1;
                debug!(item = %item.id(), "already settled");
                continue;
            }

            let result = match self.process(&item, transform, &mut report) {
                Ok(result) => result,
                Err(error) => {
                    error!(item = %item.id(), "item failed: {error:#}");
                    ItemResult::Failed(format!("{error:#}"))
                }
            };
            self.settle(&item, result, &mut report)?;
        }

        self.ledger.flush()?;
        info!(
            job = transform.name(),
            edited = report.edited,
            deleted = report.deleted,
            would_edit = report.would_edit,
            skipped = report.skipped,
            failed = report.failed.len(),
            already_done = report.already_done,
            cap_reached = report.cap_reached,
            throttled_ms = u64::try_from(self.limiter.total_waited().as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        Ok(report)
    }

    fn process(
        &mut self,
        item: &WorkItem,
        transform: &dyn Transform,
        report: &mut RunReport,
    ) -> Result<ItemResult> {
        let target = transform.target_title(item);
        let page = self
            .store
            .get_page(&target)
            .with_context(|| format!("failed to read {target}"))?;
        if !page.exists && !transform.creates_pages() {
            return Ok(ItemResult::Skipped("page does not exist".to_string()));
        }

        let mut related = BTreeMap::new();
        for title in transform.related_titles(item) {
            let snapshot = self
                .store
                .get_page(&title)
                .with_context(|| format!("failed to read {title}"))?;
            related.insert(title, snapshot);
        }

        let input = TransformInput {
            item,
            page: &page,
            related: &related,
        };
        let outcome = transform
            .apply(&input)
            .with_context(|| format!("{} transform failed on {target}", transform.name()))?;

        match outcome {
            TransformOutcome::Unchanged => Ok(ItemResult::NoOp),
            TransformOutcome::Skip(reason) => Ok(ItemResult::Skipped(reason)),
            TransformOutcome::Rewrite(text) => {
                if page.exists && is_same_text(&page.text, &text) {
                    return Ok(ItemResult::NoOp);
                }
                if !self.options.apply {
                    if self.options.show_diff {
                        report.previews.push(EditPreview {
                            title: target.clone(),
                            diff: unified_diff(&target, &page.text, &text),
                        });
                    }
                    return Ok(ItemResult::WouldEdit);
                }
                let summary = transform.summary(self.options.run_tag.as_deref());
                let request = EditRequest {
                    title: target,
                    text,
                    summary,
                    base_revision: page.revision_id,
                    create: !page.exists,
                };
                self.write(request)
            }
            TransformOutcome::Delete(reason) => {
                if !page.exists {
                    return Ok(ItemResult::Skipped("page does not exist".to_string()));
                }
                if !self.options.apply {
                    return Ok(ItemResult::WouldDelete);
                }
                let reason = self.delete_reason(&reason);
                self.delete(&page, &reason)
            }
        }
    }

    fn write(&mut self, request: EditRequest) -> Result<ItemResult> {
        let mut attempt = 0u32;
        loop {
            let outcome = self
                .store
                .set_text(&request)
                .with_context(|| format!("failed to edit {}", request.title))?;
            match outcome {
                EditOutcome::Saved { revision_id } => {
                    debug!(item = %request.title, ?revision_id, "saved");
                    return Ok(ItemResult::Edited { text: request.text });
                }
                EditOutcome::NoChange => return Ok(ItemResult::NoOp),
                EditOutcome::Conflict => {
                    return Ok(ItemResult::Failed("edit conflict".to_string()));
                }
                EditOutcome::Missing => {
                    return Ok(ItemResult::Skipped(
                        "page disappeared before write".to_string(),
                    ));
                }
                EditOutcome::RateLimited => self.back_off(&request.title, attempt, "rate limited"),
                EditOutcome::Transient(detail) => self.back_off(&request.title, attempt, &detail),
            }
            attempt = attempt.saturating_add(1);
        }
    }

    fn delete(&mut self, page: &PageSnapshot, reason: &str) -> Result<ItemResult> {
        let mut attempt = 0u32;
        loop {
            let outcome = self
                .store
                .delete(&page.title, reason)
                .with_context(|| format!("failed to delete {}", page.title))?;
            match outcome {
                DeleteOutcome::Deleted => return Ok(ItemResult::Deleted),
                DeleteOutcome::NotFound => {
                    return Ok(ItemResult::Skipped("page already deleted".to_string()));
                }
                DeleteOutcome::RateLimited => self.back_off(&page.title, attempt, "rate limited"),
                DeleteOutcome::Transient(detail) => self.back_off(&page.title, attempt, &detail),
            }
            attempt = attempt.saturating_add(1);
        }
    }

    fn back_off(&self, title: &str, attempt: u32, reason: &str) {
        let delay = self.backoff.delay(attempt);
        warn!(
            item = %title,
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "request rejected ({reason}); backing off before retry"
        );
        self.clock.sleep(delay);
    }

    fn delete_reason(&self, reason: &str) -> String {
        tagged_summary(reason, self.options.run_tag.as_deref())
    }

    /// Counts the result and records it. Ledger failures are fatal: once a
    /// write has landed the run must not continue without recording it.
    fn settle(&mut self, item: &WorkItem, result: ItemResult, report: &mut RunReport) -> Result<()> {
        let id = item.id();
        let apply = self.options.apply;
        match result {
            ItemResult::Edited { text } => {
                report.edited += 1;
                report.writes += 1;
                info!(item = %id, outcome = "edited");
                self.ledger.mark_written(id, &text)?;
                self.limiter.wait();
            }
            ItemResult::Deleted => {
                report.deleted += 1;
                report.writes += 1;
                info!(item = %id, outcome = "deleted");
                self.ledger.mark(id, LedgerStatus::Done, Some("deleted"))?;
                self.limiter.wait();
            }
            ItemResult::WouldEdit => {
                report.would_edit += 1;
                info!(item = %id, outcome = "would-edit");
            }
            ItemResult::WouldDelete => {
                report.would_edit += 1;
                info!(item = %id, outcome = "would-delete");
            }
            ItemResult::NoOp => {
                report.no_op += 1;
                report.skipped += 1;
                info!(item = %id, outcome = "no-op");
                if apply {
                    self.ledger.mark(id, LedgerStatus::Done, Some("no change"))?;
                }
            }
            ItemResult::Skipped(reason) => {
                report.skipped += 1;
                info!(item = %id, outcome = "skipped", reason = %reason);
                if apply {
                    self.ledger.mark(id, LedgerStatus::Skipped, Some(&reason))?;
                }
            }
            ItemResult::Failed(reason) => {
                warn!(item = %id, outcome = "failed", reason = %reason);
                if apply {
                    self.ledger.mark(id, LedgerStatus::Failed, Some(&reason))?;
                }
                report.failed.push(FailedItem {
                    item: id.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

fn unified_diff(title: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("{title} (current)"), &format!("{title} (proposed)"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::bail;
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::store::testing::MockStore;
    use crate::store::{EnumerateOutcome, NS_MAIN};
    use crate::throttle::testing::FakeClock;

    /// Uppercases every "cat"; the test transform from the run scenarios.
    struct ShoutCats;

    impl Transform for ShoutCats {
        fn name(&self) -> &str {
            "shout-cats"
        }

        fn summary(&self, run_tag: Option<&str>) -> String {
            tagged_summary("Bot: uppercase cats", run_tag)
        }

        fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutcome> {
            if input.page.text.contains("explode") {
                bail!("cannot parse page");
            }
            let text = input.page.text.replace("cat", "CAT");
            if text == input.page.text {
                return Ok(TransformOutcome::Unchanged);
            }
            Ok(TransformOutcome::Rewrite(text))
        }
    }

    struct DeleteAll;

    impl Transform for DeleteAll {
        fn name(&self) -> &str {
            "delete-all"
        }

        fn summary(&self, run_tag: Option<&str>) -> String {
            tagged_summary("Bot: delete", run_tag)
        }

        fn apply(&self, _input: &TransformInput<'_>) -> Result<TransformOutcome> {
            Ok(TransformOutcome::Delete("Bot: cleanup".to_string()))
        }
    }

    struct Fixture {
        _temp: TempDir,
        ledger_path: std::path::PathBuf,
        clock: FakeClock,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempdir().expect("tempdir");
            let ledger_path = temp.path().join("state").join("job.ledger.jsonl");
            Self {
                _temp: temp,
                ledger_path,
                clock: FakeClock::default(),
            }
        }

        fn ledger(&self) -> ProgressLedger {
            ProgressLedger::open(&self.ledger_path).expect("open ledger")
        }

        fn run(
            &self,
            store: &mut MockStore,
            worklist: &mut Worklist,
            transform: &dyn Transform,
            options: RunOptions,
        ) -> RunReport {
            let mut ledger = self.ledger();
            let limiter = RateLimiter::new(Duration::from_millis(1_500), self.clock.clone());
            let mut runner = BatchRunner::new(
                store,
                &mut ledger,
                limiter,
                BackoffPolicy::default(),
                self.clock.clone(),
                options,
            );
            runner.run(worklist, transform).expect("run")
        }
    }

    fn apply() -> RunOptions {
        RunOptions {
            apply: true,
            ..RunOptions::default()
        }
    }

    fn titles(names: &[&str]) -> Worklist {
        Worklist::from_titles(names.iter().map(ToString::to_string).collect())
    }

    fn abcd_store() -> MockStore {
        MockStore::with_pages(&[
            ("A", "a cat"),
            ("B", "the cat sat"),
            ("C", "CAT"),
            ("D", "cat cat"),
        ])
    }

    #[test]
    fn writes_changed_pages_and_skips_no_ops() {
        let fixture = Fixture::new();
        let mut store = abcd_store();
        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "B", "C", "D"]),
            &ShoutCats,
            apply(),
        );

        assert_eq!(store.written_titles(), vec!["A", "B", "D"]);
        assert_eq!(report.edited, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.no_op, 1);
        assert!(report.failed.is_empty());
        assert_eq!(store.pages.get("D").map(String::as_str), Some("CAT CAT"));

        let ledger = fixture.ledger();
        for id in ["A", "B", "C", "D"] {
            assert!(ledger.is_done(id), "{id} should be done");
        }
        assert_eq!(ledger.summary().done, 4);
    }

    #[test]
    fn rerun_performs_no_remote_io() {
        let fixture = Fixture::new();
        let mut store = abcd_store();
        fixture.run(
            &mut store,
            &mut titles(&["A", "B", "C", "D"]),
            &ShoutCats,
            apply(),
        );
        let requests_after_first = store.request_count();

        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "B", "C", "D"]),
            &ShoutCats,
            apply(),
        );
        assert_eq!(store.request_count(), requests_after_first);
        assert_eq!(report.already_done, 4);
        assert_eq!(report.edited, 0);
        assert_eq!(store.writes.len(), 3);
    }

    #[test]
    fn already_correct_pages_produce_zero_writes() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "CAT  \n\n"), ("B", "no felines")]);
        let report = fixture.run(&mut store, &mut titles(&["A", "B"]), &ShoutCats, apply());
        assert!(store.writes.is_empty());
        assert_eq!(report.no_op, 2);
        assert!(fixture.ledger().is_done("A"));
        assert!(fixture.ledger().is_done("B"));
    }

    #[test]
    fn cap_stops_cleanly_and_next_run_continues() {
        let fixture = Fixture::new();
        let names = (0..1000).map(|n| format!("Page {n:04}")).collect::<Vec<_>>();
        let pages = names
            .iter()
            .map(|name| (name.as_str(), "cat"))
            .collect::<Vec<_>>();
        let mut store = MockStore::with_pages(&pages);
        let options = RunOptions {
            apply: true,
            max_edits: Some(100),
            ..RunOptions::default()
        };

        let report = fixture.run(
            &mut store,
            &mut Worklist::from_titles(names.clone()),
            &ShoutCats,
            options.clone(),
        );
        assert_eq!(store.writes.len(), 100);
        assert_eq!(report.edited, 100);
        assert!(report.cap_reached);
        assert_eq!(fixture.ledger().summary().done, 100);
        assert_eq!(store.written_titles().last().map(String::as_str), Some("Page 0099"));

        let report = fixture.run(
            &mut store,
            &mut Worklist::from_titles(names),
            &ShoutCats,
            options,
        );
        assert_eq!(report.already_done, 100);
        assert_eq!(report.edited, 100);
        assert_eq!(store.writes.len(), 200);
        assert_eq!(store.written_titles()[100], "Page 0100");
        assert_eq!(fixture.ledger().summary().done, 200);
    }

    #[test]
    fn cap_is_not_reported_when_worklist_drains_exactly() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat"), ("B", "cat")]);
        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "B"]),
            &ShoutCats,
            RunOptions {
                apply: true,
                max_edits: Some(2),
                ..RunOptions::default()
            },
        );
        assert_eq!(report.edited, 2);
        assert!(!report.cap_reached);
    }

    #[test]
    fn conflict_is_isolated_and_retried_next_run() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat"), ("X", "cat"), ("B", "cat")]);
        store.script_edit("X", &[EditOutcome::Conflict]);

        let report = fixture.run(&mut store, &mut titles(&["A", "X", "B"]), &ShoutCats, apply());
        assert_eq!(store.written_titles(), vec!["A", "B"]);
        assert_eq!(
            report.failed,
            vec![FailedItem {
                item: "X".to_string(),
                reason: "edit conflict".to_string()
            }]
        );
        let ledger = fixture.ledger();
        assert_eq!(ledger.status_of("X"), Some(LedgerStatus::Failed));

        let report = fixture.run(&mut store, &mut titles(&["A", "X", "B"]), &ShoutCats, apply());
        assert_eq!(report.already_done, 2);
        assert_eq!(report.edited, 1);
        assert!(fixture.ledger().is_done("X"));
    }

    #[test]
    fn rate_limits_back_off_and_retry_same_item() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat"), ("B", "cat")]);
        store.script_edit(
            "A",
            &[
                EditOutcome::RateLimited,
                EditOutcome::Transient("HTTP 503".to_string()),
                EditOutcome::Saved {
                    revision_id: Some(7),
                },
            ],
        );

        let report = fixture.run(&mut store, &mut titles(&["A", "B"]), &ShoutCats, apply());
        assert_eq!(report.edited, 2);
        assert!(report.failed.is_empty());
        assert_eq!(
            fixture.clock.sleeps(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(60),
                Duration::from_millis(1_500),
                Duration::from_millis(1_500),
            ]
        );
    }

    #[test]
    fn transform_and_read_errors_do_not_abort_the_run() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[
            ("A", "cat"),
            ("Bad", "explode"),
            ("Gone", "cat"),
            ("D", "cat"),
        ]);
        store.failing_reads.push("Gone".to_string());

        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "Bad", "Gone", "D"]),
            &ShoutCats,
            apply(),
        );
        assert_eq!(store.written_titles(), vec!["A", "D"]);
        let failed = report
            .failed
            .iter()
            .map(|failed| failed.item.as_str())
            .collect::<Vec<_>>();
        assert_eq!(failed, vec!["Bad", "Gone"]);
        assert!(report.failed[0].reason.contains("cannot parse page"));
        assert!(report.failed[1].reason.contains("HTTP 500"));
        assert_eq!(fixture.ledger().summary().failed, 2);
    }

    #[test]
    fn missing_pages_are_skipped_not_created() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat")]);
        let report = fixture.run(&mut store, &mut titles(&["Nowhere", "A"]), &ShoutCats, apply());
        assert_eq!(report.skipped, 1);
        assert_eq!(store.written_titles(), vec!["A"]);
        assert_eq!(
            fixture.ledger().status_of("Nowhere"),
            Some(LedgerStatus::Skipped)
        );
    }

    #[test]
    fn page_deleted_mid_run_is_skipped() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat")]);
        store.script_edit("A", &[EditOutcome::Missing]);
        let report = fixture.run(&mut store, &mut titles(&["A"]), &ShoutCats, apply());
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn dry_run_never_writes_or_marks() {
        let fixture = Fixture::new();
        let mut store = abcd_store();
        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "B", "C", "D"]),
            &ShoutCats,
            RunOptions {
                show_diff: true,
                max_edits: Some(2),
                ..RunOptions::default()
            },
        );
        assert_eq!(report.mode, RunMode::DryRun);
        assert!(store.writes.is_empty());
        assert_eq!(report.would_edit, 2);
        assert!(report.cap_reached);
        assert_eq!(report.previews.len(), 2);
        assert!(report.previews[0].diff.contains("-a cat"));
        assert!(report.previews[0].diff.contains("+a CAT"));
        assert!(fixture.ledger().is_empty());
        assert!(!fixture.ledger_path.exists());
        assert!(fixture.clock.sleeps().is_empty());
    }

    #[test]
    fn dry_run_still_honours_the_ledger() {
        let fixture = Fixture::new();
        let mut ledger = fixture.ledger();
        ledger.mark("A", LedgerStatus::Done, None).expect("mark");
        drop(ledger);

        let mut store = abcd_store();
        let report = fixture.run(
            &mut store,
            &mut titles(&["A", "B"]),
            &ShoutCats,
            RunOptions::default(),
        );
        assert_eq!(report.already_done, 1);
        assert_eq!(report.would_edit, 1);
        assert_eq!(store.reads, vec!["B"]);
    }

    #[test]
    fn deletions_are_recorded_and_throttled() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("Junk 1", "x"), ("Junk 2", "y")]);
        let report = fixture.run(
            &mut store,
            &mut titles(&["Junk 1", "Missing junk", "Junk 2"]),
            &DeleteAll,
            RunOptions {
                apply: true,
                run_tag: Some("sweep".to_string()),
                ..RunOptions::default()
            },
        );
        assert_eq!(store.deletes, vec!["Junk 1", "Junk 2"]);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.writes, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(fixture.clock.sleeps().len(), 2);
    }

    #[test]
    fn transient_listing_failures_back_off_and_resume() {
        let fixture = Fixture::new();
        let mut store = MockStore::with_pages(&[("A", "cat"), ("B", "cat"), ("C", "cat")]);
        store
            .scripted_listings
            .push_back(EnumerateOutcome::Transient("HTTP 503".to_string()));

        let report = fixture.run(
            &mut store,
            &mut Worklist::namespace(NS_MAIN, false),
            &ShoutCats,
            apply(),
        );
        assert_eq!(store.written_titles(), vec!["A", "B", "C"]);
        assert!(report.failed.is_empty());
        assert_eq!(store.enumerations, 3);
        assert_eq!(fixture.clock.sleeps()[0], Duration::from_secs(60));
    }

    #[test]
    fn cap_stops_without_fetching_another_listing_page() {
        let fixture = Fixture::new();
        let mut store =
            MockStore::with_pages(&[("A", "cat"), ("B", "cat"), ("C", "cat"), ("D", "cat")]);
        let report = fixture.run(
            &mut store,
            &mut Worklist::namespace(NS_MAIN, false),
            &ShoutCats,
            RunOptions {
                apply: true,
                max_edits: Some(2),
                ..RunOptions::default()
            },
        );
        assert_eq!(report.edited, 2);
        assert!(report.cap_reached);
        assert_eq!(store.enumerations, 1);
    }
}
