use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::BotConfig;

pub const STATE_DIR_NAME: &str = ".shintobot";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const LEDGER_SUFFIX: &str = ".ledger.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub state_source: ValueSource,
}

impl ResolvedPaths {
    /// Applies `[state].dir` from the loaded config, relative to the
    /// project root.
    pub fn apply_config(&mut self, config: &BotConfig) {
        if let Some(dir) = config.state_dir_override() {
            self.state_dir = absolutize(Path::new(dir), &self.project_root);
            self.state_source = ValueSource::Config;
        }
    }

    pub fn ledger_path(&self, job: &str) -> PathBuf {
        self.state_dir.join(format!("{job}{LEDGER_SUFFIX}"))
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nconfig_path={} ({})\nstate_dir={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.state_dir),
            self.state_source.as_str(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SHINTOBOT_PROJECT_ROOT")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        (absolutize(Path::new(&value), &context.cwd), ValueSource::Env)
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let base_dir = project_root.join(STATE_DIR_NAME);
    let (config_path, config_source) = match overrides.config.as_deref() {
        Some(path) => (absolutize(path, &project_root), ValueSource::Flag),
        None => (base_dir.join(CONFIG_FILENAME), ValueSource::Default),
    };

    Ok(ResolvedPaths {
        state_dir: base_dir.join("state"),
        project_root,
        config_path,
        root_source,
        config_source,
        state_source: ValueSource::Default,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
