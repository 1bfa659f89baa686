use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::throttle::BackoffPolicy;

pub const DEFAULT_USER_AGENT: &str = "shintobot/0.1 (User:EmmaBot)";
pub const DEFAULT_API_URL: &str = "https://shinto.miraheze.org/w/api.php";
pub const DEFAULT_WRITE_INTERVAL_MS: u64 = 1_500;
pub const DEFAULT_READ_INTERVAL_MS: u64 = 300;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 60_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub throttle: ThrottleSection,
    #[serde(default)]
    pub state: StateSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ThrottleSection {
    pub write_interval_ms: Option<u64>,
    pub read_interval_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_factor: Option<u32>,
    pub backoff_max_ms: Option<u64>,
    pub backoff_jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StateSection {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl BotConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(
            self.throttle
                .write_interval_ms
                .unwrap_or(DEFAULT_WRITE_INTERVAL_MS),
        )
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(
            self.throttle
                .read_interval_ms
                .unwrap_or(DEFAULT_READ_INTERVAL_MS),
        )
    }

    /// Backoff applied when the wiki rejects a write as throttled. Defaults to
    /// a fixed 60 second wait.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let base = Duration::from_millis(
            self.throttle
                .backoff_base_ms
                .unwrap_or(DEFAULT_BACKOFF_BASE_MS),
        );
        BackoffPolicy {
            base,
            factor: self.throttle.backoff_factor.unwrap_or(1).max(1),
            max: self
                .throttle
                .backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(base)
                .max(base),
            jitter: Duration::from_millis(self.throttle.backoff_jitter_ms.unwrap_or(0)),
        }
    }

    pub fn state_dir_override(&self) -> Option<&str> {
        self.state
            .dir
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Load and parse a BotConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Read bot credentials from WIKI_USERNAME / WIKI_PASSWORD.
pub fn credentials_from_env() -> Result<Credentials> {
    let username = env_override("WIKI_USERNAME")
        .ok_or_else(|| anyhow::anyhow!("WIKI_USERNAME is required for --apply"))?;
    let password = env_override("WIKI_PASSWORD")
        .ok_or_else(|| anyhow::anyhow!("WIKI_PASSWORD is required for --apply"))?;
    Ok(Credentials { username, password })
}

fn env_override(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
