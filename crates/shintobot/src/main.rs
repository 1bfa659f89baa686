use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use shintobot_core::config::{BotConfig, credentials_from_env, load_config};
use shintobot_core::jobs::{
    DeletePages, JOB_NAMES, MergeCategory, MigrateTalk, NormalizeCategories, RemoveCategory,
    StripLegacyTemplates, UpdateStatus,
};
use shintobot_core::ledger::ProgressLedger;
use shintobot_core::mediawiki::{MediaWikiClient, MediaWikiClientConfig};
use shintobot_core::runner::{BatchRunner, RunOptions, RunReport};
use shintobot_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use shintobot_core::store::PageStore;
use shintobot_core::throttle::{RateLimiter, SystemClock};
use shintobot_core::transform::Transform;
use shintobot_core::worklist::{Worklist, parse_titles_arg, parse_titles_file};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "shintobot",
    version,
    about = "Resumable, rate-limited maintenance jobs for the Shinto wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log at debug level")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Rebuild category pages into templates, interwikis and categories")]
    NormalizeCategories(NormalizeCategoriesArgs),
    #[command(about = "Remove legacy import templates from category pages")]
    StripLegacyTemplates(RunArgs),
    #[command(about = "Remove a category tag from every member page")]
    RemoveCategory(RemoveCategoryArgs),
    #[command(about = "Move members of one category into another and redirect the source")]
    MergeCategory(MergeCategoryArgs),
    #[command(about = "Rebuild talk pages into the standard layout")]
    MigrateTalk(RunArgs),
    #[command(about = "Delete listed pages")]
    DeletePages(DeletePagesArgs),
    #[command(about = "Write the run status block on the bot's user page")]
    UpdateStatus(UpdateStatusArgs),
    #[command(about = "Inspect or reset a job's progress ledger")]
    Ledger(LedgerArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct RunArgs {
    #[arg(long, help = "Save edits (default is a dry run)")]
    apply: bool,
    #[arg(long, value_name = "N", help = "Stop after N edits (0 = no cap)")]
    max_edits: Option<usize>,
    #[arg(long, value_name = "TITLE", help = "Resume from this title (inclusive)")]
    start: Option<String>,
    #[arg(long, value_name = "TEXT", help = "Annotation added to edit summaries and the ledger")]
    run_tag: Option<String>,
    #[arg(long, value_name = "LIST", help = "Comma-separated titles to process")]
    titles: Option<String>,
    #[arg(long, value_name = "PATH", help = "File with one title per line")]
    titles_file: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Ledger file (default: <state_dir>/<job>.ledger.jsonl)")]
    ledger: Option<PathBuf>,
    #[arg(long, help = "Print a unified diff for each would-be edit")]
    show_diff: bool,
}

impl RunArgs {
    /// Titles from `--titles` and `--titles-file`, or `None` when neither
    /// was given.
    fn explicit_titles(&self) -> Result<Option<Vec<String>>> {
        if self.titles.is_none() && self.titles_file.is_none() {
            return Ok(None);
        }
        let mut titles = self
            .titles
            .as_deref()
            .map(parse_titles_arg)
            .unwrap_or_default();
        if let Some(path) = &self.titles_file {
            for title in parse_titles_file(path)? {
                if !titles.contains(&title) {
                    titles.push(title);
                }
            }
        }
        Ok(Some(titles))
    }

    fn worklist_or(&self, default: impl FnOnce() -> Worklist) -> Result<Worklist> {
        Ok(match self.explicit_titles()? {
            Some(titles) => Worklist::from_titles(titles),
            None => default(),
        })
    }

    /// Like `worklist_or`, but bare explicit titles name category pages.
    fn category_worklist_or(&self, default: impl FnOnce() -> Worklist) -> Result<Worklist> {
        Ok(match self.explicit_titles()? {
            Some(titles) => Worklist::from_category_titles(titles),
            None => default(),
        })
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            apply: self.apply,
            max_edits: self.max_edits.filter(|cap| *cap > 0),
            run_tag: self.run_tag.clone(),
            show_diff: self.show_diff,
        }
    }
}

#[derive(Debug, Args)]
struct NormalizeCategoriesArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, help = "Also process category redirects")]
    include_redirects: bool,
}

#[derive(Debug, Args)]
struct RemoveCategoryArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, value_name = "NAME")]
    category: String,
}

#[derive(Debug, Args)]
struct MergeCategoryArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, value_name = "NAME", help = "Category to empty and redirect")]
    from: String,
    #[arg(long, value_name = "NAME", help = "Category that receives the members")]
    to: String,
}

#[derive(Debug, Args)]
struct DeletePagesArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, value_name = "NAME", help = "Delete the members of this category")]
    category: Option<String>,
    #[arg(long, value_name = "TEXT")]
    reason: Option<String>,
}

#[derive(Debug, Args)]
struct UpdateStatusArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, value_name = "TITLE", default_value = "User:EmmaBot")]
    page: String,
    #[arg(long, value_name = "PATH", help = "Base page text to place the status block into")]
    template: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct LedgerArgs {
    #[command(subcommand)]
    command: LedgerCommand,
}

#[derive(Debug, Subcommand)]
enum LedgerCommand {
    Show(LedgerJobArgs),
    Clear(LedgerJobArgs),
}

#[derive(Debug, Args)]
struct LedgerJobArgs {
    #[arg(long, value_name = "NAME")]
    job: String,
    #[arg(long, value_name = "PATH")]
    ledger: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerMode {
    Resume,
    /// Start from an empty ledger; used by jobs that must re-apply every run.
    Fresh,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Commands::NormalizeCategories(args) => {
            let job = NormalizeCategories::new(args.include_redirects)?;
            let worklist = args.run.category_worklist_or(|| job.worklist())?;
            run_job(&runtime, &args.run, &job, worklist, LedgerMode::Resume)
        }
        Commands::StripLegacyTemplates(args) => {
            let job = StripLegacyTemplates::new()?;
            let worklist = args.category_worklist_or(StripLegacyTemplates::worklist)?;
            run_job(&runtime, &args, &job, worklist, LedgerMode::Resume)
        }
        Commands::RemoveCategory(args) => {
            let job = RemoveCategory::new(&args.category)?;
            let worklist = args.run.worklist_or(|| job.worklist())?;
            run_job(&runtime, &args.run, &job, worklist, LedgerMode::Resume)
        }
        Commands::MergeCategory(args) => {
            let job = MergeCategory::new(&args.from, &args.to)?;
            let worklist = args.run.worklist_or(|| job.worklist())?;
            run_job(&runtime, &args.run, &job, worklist, LedgerMode::Resume)
        }
        Commands::MigrateTalk(args) => {
            let worklist = MigrateTalk::worklist(args.explicit_titles()?);
            run_job(&runtime, &args, &MigrateTalk, worklist, LedgerMode::Resume)
        }
        Commands::DeletePages(args) => {
            let job = DeletePages::new(args.reason.as_deref());
            let worklist = match (args.run.explicit_titles()?, args.category.as_deref()) {
                (Some(titles), _) => Worklist::from_titles(titles),
                (None, Some(category)) => Worklist::category(category, None),
                (None, None) => bail!("delete-pages needs --titles, --titles-file or --category"),
            };
            run_job(&runtime, &args.run, &job, worklist, LedgerMode::Resume)
        }
        Commands::UpdateStatus(args) => {
            let template = args
                .template
                .as_ref()
                .map(|path| {
                    fs::read_to_string(path).with_context(|| {
                        format!("failed to read status template {}", path.display())
                    })
                })
                .transpose()?;
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let job = UpdateStatus::new(&args.page, template, &now, args.run.run_tag.as_deref())?;
            let worklist = job.worklist();
            run_job(&runtime, &args.run, &job, worklist, LedgerMode::Fresh)
        }
        Commands::Ledger(LedgerArgs { command }) => match command {
            LedgerCommand::Show(args) => run_ledger_show(&runtime, &args),
            LedgerCommand::Clear(args) => run_ledger_clear(&runtime, &args),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_job(
    runtime: &RuntimeOptions,
    args: &RunArgs,
    transform: &dyn Transform,
    worklist: Worklist,
    ledger_mode: LedgerMode,
) -> Result<()> {
    let (paths, config) = load_runtime(runtime)?;

    // Credentials are checked before any remote I/O.
    let credentials = if args.apply {
        Some(credentials_from_env()?)
    } else {
        None
    };
    let ledger_path = args
        .ledger
        .clone()
        .unwrap_or_else(|| paths.ledger_path(transform.name()));

    let report = execute_job(
        args,
        transform,
        worklist,
        &ledger_path,
        ledger_mode,
        &config,
        || {
            let mut client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
            if let Some(credentials) = &credentials {
                client.login(&credentials.username, &credentials.password)?;
                info!(user = %credentials.username, api = client.api_url(), "logged in");
            }
            Ok(client)
        },
    )?;

    print_report(&report);
    println!("ledger: {}", normalize_for_display(&ledger_path));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

/// Opens the ledger, then connects and runs. A corrupt or unreadable ledger
/// fails before `connect` is called.
fn execute_job<S, F>(
    args: &RunArgs,
    transform: &dyn Transform,
    worklist: Worklist,
    ledger_path: &Path,
    ledger_mode: LedgerMode,
    config: &BotConfig,
    connect: F,
) -> Result<RunReport>
where
    S: PageStore,
    F: FnOnce() -> Result<S>,
{
    let mut ledger = ProgressLedger::open(ledger_path)?.with_run_tag(args.run_tag.as_deref());
    if ledger_mode == LedgerMode::Fresh && args.apply {
        ledger.clear()?;
    }

    let mut store = connect()?;
    let mut worklist = worklist.starting_at(args.start.as_deref());
    let limiter = RateLimiter::new(config.write_interval(), SystemClock);
    let mut runner = BatchRunner::new(
        &mut store,
        &mut ledger,
        limiter,
        config.backoff_policy(),
        SystemClock,
        args.options(),
    );
    runner.run(&mut worklist, transform)
}

fn print_report(report: &RunReport) {
    println!("job: {}", report.job);
    println!("mode: {}", report.mode.as_str());
    println!("edited: {}", report.edited);
    println!("deleted: {}", report.deleted);
    println!("would_edit: {}", report.would_edit);
    println!("skipped: {}", report.skipped);
    println!("no_op: {}", report.no_op);
    println!("failed: {}", report.failed.len());
    println!("already_done: {}", report.already_done);
    println!("cap_reached: {}", report.cap_reached);
    for failed in &report.failed {
        println!("failed.item: {} ({})", failed.item, failed.reason);
    }
    for preview in &report.previews {
        println!("\n{}", preview.diff);
    }
}

fn run_ledger_show(runtime: &RuntimeOptions, args: &LedgerJobArgs) -> Result<()> {
    let (paths, _) = load_runtime(runtime)?;
    let path = ledger_path_for(&paths, args)?;
    let ledger = ProgressLedger::open(&path)?;
    let summary = ledger.summary();

    println!("job: {}", args.job);
    println!("ledger: {}", normalize_for_display(&path));
    println!("items: {}", ledger.len());
    println!("done: {}", summary.done);
    println!("skipped: {}", summary.skipped);
    println!("failed: {}", summary.failed);
    for record in ledger.records() {
        if let Some(detail) = &record.detail {
            println!("{}: {} {} ({detail})", record.status.as_str(), record.item, record.ts);
        } else {
            println!("{}: {} {}", record.status.as_str(), record.item, record.ts);
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_ledger_clear(runtime: &RuntimeOptions, args: &LedgerJobArgs) -> Result<()> {
    let (paths, _) = load_runtime(runtime)?;
    let path = ledger_path_for(&paths, args)?;
    let mut ledger = ProgressLedger::open(&path)?;
    let cleared = ledger.len();
    ledger.clear()?;

    println!("job: {}", args.job);
    println!("ledger: {}", normalize_for_display(&path));
    println!("cleared_items: {cleared}");
    Ok(())
}

fn ledger_path_for(paths: &ResolvedPaths, args: &LedgerJobArgs) -> Result<PathBuf> {
    if let Some(path) = &args.ledger {
        return Ok(path.clone());
    }
    if !JOB_NAMES.contains(&args.job.as_str()) {
        bail!(
            "unknown job `{}` (expected one of: {})",
            args.job,
            JOB_NAMES.join(", ")
        );
    }
    Ok(paths.ledger_path(&args.job))
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, BotConfig)> {
    let mut paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    paths.apply_config(&config);
    Ok((paths, config))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path(&project_env);
    }

    resolve_paths(&context, &overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shintobot_core::store::{
        DeleteOutcome, EditOutcome, EditRequest, EnumerateOutcome, EnumerateRequest, PageSnapshot,
    };
    use shintobot_core::worklist::Pull;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    #[test]
    fn run_flags_are_shared_by_jobs() {
        let cli = parse(&[
            "shintobot",
            "normalize-categories",
            "--apply",
            "--max-edits",
            "100",
            "--start",
            "Category:M",
            "--run-tag",
            "nightly",
            "--include-redirects",
        ]);
        let Commands::NormalizeCategories(args) = cli.command else {
            panic!("expected normalize-categories");
        };
        assert!(args.include_redirects);
        assert_eq!(
            args.run.options(),
            RunOptions {
                apply: true,
                max_edits: Some(100),
                run_tag: Some("nightly".to_string()),
                show_diff: false,
            }
        );
        assert_eq!(args.run.start.as_deref(), Some("Category:M"));
    }

    #[test]
    fn zero_max_edits_means_no_cap() {
        let cli = parse(&["shintobot", "strip-legacy-templates", "--max-edits", "0"]);
        let Commands::StripLegacyTemplates(args) = cli.command else {
            panic!("expected strip-legacy-templates");
        };
        assert_eq!(args.options().max_edits, None);
        assert!(!args.options().apply);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = parse(&[
            "shintobot",
            "merge-category",
            "--from",
            "神社",
            "--to",
            "Shinto shrines",
            "--project-root",
            "/srv/bot",
            "--verbose",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.project_root, Some(PathBuf::from("/srv/bot")));
        assert!(matches!(cli.command, Commands::MergeCategory(_)));
    }

    #[test]
    fn remove_category_requires_a_name() {
        assert!(Cli::try_parse_from(["shintobot", "remove-category"]).is_err());
    }

    #[test]
    fn explicit_titles_merge_flag_and_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("titles.txt");
        fs::write(&file, "# batch\nIzumo-taisha\nIse_Grand_Shrine\n").expect("write titles");
        let args = RunArgs {
            titles: Some("Ise Grand Shrine, Atsuta Shrine".to_string()),
            titles_file: Some(file),
            ..RunArgs::default()
        };
        assert_eq!(
            args.explicit_titles().expect("titles"),
            Some(vec![
                "Ise Grand Shrine".to_string(),
                "Atsuta Shrine".to_string(),
                "Izumo-taisha".to_string(),
            ])
        );
        assert_eq!(RunArgs::default().explicit_titles().expect("titles"), None);
    }

    #[test]
    fn ledger_subcommand_parses_job() {
        let cli = parse(&["shintobot", "ledger", "clear", "--job", "migrate-talk"]);
        let Commands::Ledger(LedgerArgs {
            command: LedgerCommand::Clear(args),
        }) = cli.command
        else {
            panic!("expected ledger clear");
        };
        assert_eq!(args.job, "migrate-talk");
    }

    #[test]
    fn update_status_defaults_to_bot_user_page() {
        let cli = parse(&["shintobot", "update-status", "--apply"]);
        let Commands::UpdateStatus(args) = cli.command else {
            panic!("expected update-status");
        };
        assert_eq!(args.page, "User:EmmaBot");
        assert!(args.template.is_none());
    }

    #[test]
    fn category_jobs_read_bare_titles_as_category_pages() {
        let args = RunArgs {
            titles: Some("Inari shrines, Category:Hachiman shrines".to_string()),
            ..RunArgs::default()
        };
        let mut worklist = args
            .category_worklist_or(|| panic!("explicit titles were given"))
            .expect("worklist");
        let mut titles = Vec::new();
        let mut offline = Offline;
        while let Pull::Item(item) = worklist.next_item(&mut offline).expect("next") {
            titles.push(item.title);
        }
        assert_eq!(
            titles,
            vec!["Category:Inari shrines", "Category:Hachiman shrines"]
        );
    }

    #[test]
    fn corrupt_ledger_aborts_before_connecting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger_path = temp.path().join("normalize-categories.ledger.jsonl");
        fs::write(&ledger_path, "not json\n").expect("write ledger");
        let job = NormalizeCategories::new(false).expect("job");
        let mut connected = false;

        let error = execute_job(
            &RunArgs {
                apply: true,
                ..RunArgs::default()
            },
            &job,
            Worklist::from_titles(vec!["Category:Shrines".to_string()]),
            &ledger_path,
            LedgerMode::Resume,
            &BotConfig::default(),
            || {
                connected = true;
                Ok(Offline)
            },
        )
        .expect_err("corrupt ledger must fail");
        assert!(format!("{error:#}").contains("line 1"));
        assert!(!connected);
    }

    #[test]
    fn readable_ledger_connects_before_any_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger_path = temp.path().join("normalize-categories.ledger.jsonl");
        let job = NormalizeCategories::new(false).expect("job");

        let error = execute_job(
            &RunArgs::default(),
            &job,
            Worklist::from_titles(vec!["Category:Shrines".to_string()]),
            &ledger_path,
            LedgerMode::Resume,
            &BotConfig::default(),
            || -> Result<Offline> { bail!("wiki unreachable") },
        )
        .expect_err("connect failure must fail");
        assert!(format!("{error:#}").contains("wiki unreachable"));
    }

    /// Store that refuses every request.
    struct Offline;

    impl PageStore for Offline {
        fn login(&mut self, _username: &str, _password: &str) -> Result<()> {
            bail!("offline")
        }

        fn get_page(&mut self, _title: &str) -> Result<PageSnapshot> {
            bail!("offline")
        }

        fn set_text(&mut self, _request: &EditRequest) -> Result<EditOutcome> {
            bail!("offline")
        }

        fn enumerate(&mut self, _request: &EnumerateRequest) -> Result<EnumerateOutcome> {
            bail!("offline")
        }

        fn delete(&mut self, _title: &str, _reason: &str) -> Result<DeleteOutcome> {
            bail!("offline")
        }

        fn request_count(&self) -> usize {
            0
        }
    }
}
