use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Done,
    Skipped,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Settled items are never picked up again until the ledger is cleared.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub item: String,
    pub status: LedgerStatus,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Append-only JSON-lines record of item outcomes for one job.
///
/// Every `mark` is written and synced to disk before it returns, so a crash
/// loses at most the item in flight. The latest record for an item wins.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    run_tag: Option<String>,
    latest: BTreeMap<String, LedgerRecord>,
    file: Option<File>,
    /// File length when last loaded; a different length at first append
    /// means another instance has written since.
    loaded_len: u64,
    valid_len: u64,
    needs_newline: bool,
}

impl ProgressLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let mut ledger = Self {
            path: path.to_path_buf(),
            run_tag: None,
            latest: BTreeMap::new(),
            file: None,
            loaded_len: 0,
            valid_len: 0,
            needs_newline: false,
        };
        ledger.load()?;
        Ok(ledger)
    }

    pub fn with_run_tag(mut self, run_tag: Option<&str>) -> Self {
        self.run_tag = run_tag
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the ledger file and returns the ids of settled items.
    pub fn load(&mut self) -> Result<BTreeSet<String>> {
        self.file = None;
        self.latest.clear();
        self.loaded_len = 0;
        self.valid_len = 0;
        self.needs_newline = false;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read ledger {}", self.path.display()));
            }
        };
        self.loaded_len = content.len() as u64;

        let mut offset = 0u64;
        for (index, segment) in content.split_inclusive('\n').enumerate() {
            let terminated = segment.ends_with('\n');
            offset += segment.len() as u64;
            let line = segment.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                if terminated {
                    self.valid_len = offset;
                }
                continue;
            }
            match serde_json::from_str::<LedgerRecord>(line) {
                Ok(record) => {
                    self.valid_len = offset;
                    self.needs_newline = !terminated;
                    self.latest.insert(record.item.clone(), record);
                }
                Err(error) if !terminated => {
                    warn!(
                        ledger = %self.path.display(),
                        line = index + 1,
                        "dropping torn final ledger line: {error}"
                    );
                }
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!(
                            "ledger {} is corrupt at line {}",
                            self.path.display(),
                            index + 1
                        )
                    });
                }
            }
        }

        Ok(self.settled_items())
    }

    pub fn is_done(&self, item: &str) -> bool {
        self.status_of(item).is_some_and(LedgerStatus::is_settled)
    }

    pub fn status_of(&self, item: &str) -> Option<LedgerStatus> {
        self.latest.get(item).map(|record| record.status)
    }

    pub fn mark(&mut self, item: &str, status: LedgerStatus, detail: Option<&str>) -> Result<()> {
        let record = self.record(item, status, detail, None);
        self.append(record)
    }

    /// Marks an item done after a successful write, recording a hash of
    /// the text that was saved.
    pub fn mark_written(&mut self, item: &str, written_text: &str) -> Result<()> {
        let record = self.record(
            item,
            LedgerStatus::Done,
            None,
            Some(content_hash(written_text)),
        );
        self.append(record)
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = &self.file {
            file.sync_all()
                .with_context(|| format!("failed to sync ledger {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Deletes the ledger file, forcing a full re-run.
    pub fn clear(&mut self) -> Result<()> {
        self.file = None;
        self.latest.clear();
        self.loaded_len = 0;
        self.valid_len = 0;
        self.needs_newline = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error)
                .with_context(|| format!("failed to remove ledger {}", self.path.display())),
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for record in self.latest.values() {
            match record.status {
                LedgerStatus::Done => summary.done += 1,
                LedgerStatus::Skipped => summary.skipped += 1,
                LedgerStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn records(&self) -> impl Iterator<Item = &LedgerRecord> {
        self.latest.values()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    fn settled_items(&self) -> BTreeSet<String> {
        self.latest
            .values()
            .filter(|record| record.status.is_settled())
            .map(|record| record.item.clone())
            .collect()
    }

    fn record(
        &self,
        item: &str,
        status: LedgerStatus,
        detail: Option<&str>,
        content_hash: Option<String>,
    ) -> LedgerRecord {
        LedgerRecord {
            item: item.to_string(),
            status,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            detail: detail.map(ToString::to_string),
            run_tag: self.run_tag.clone(),
            content_hash,
        }
    }

    fn append(&mut self, record: LedgerRecord) -> Result<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_for_append()?,
        };
        let mut line = serde_json::to_string(&record).context("failed to encode ledger record")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to ledger {}", self.path.display()))?;
        file.sync_data()
            .with_context(|| format!("failed to sync ledger {}", self.path.display()))?;
        self.file = Some(file);
        self.valid_len += line.len() as u64;
        self.latest.insert(record.item.clone(), record);
        Ok(())
    }

    fn open_for_append(&mut self) -> Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open ledger {}", self.path.display()))?;

        let on_disk = file
            .metadata()
            .with_context(|| format!("failed to stat ledger {}", self.path.display()))?
            .len();
        let needs_newline = if on_disk == self.loaded_len {
            if on_disk > self.valid_len {
                file.set_len(self.valid_len).with_context(|| {
                    format!("failed to truncate torn tail of {}", self.path.display())
                })?;
            }
            self.needs_newline
        } else {
            // Another instance appended since load; its records stay.
            debug!(
                ledger = %self.path.display(),
                loaded = self.loaded_len,
                on_disk,
                "ledger grew since load; appending after existing records"
            );
            on_disk > 0
                && !ends_with_newline(&mut file).with_context(|| {
                    format!("failed to read ledger {}", self.path.display())
                })?
        };
        if needs_newline {
            file.write_all(b"\n")
                .with_context(|| format!("failed to append to ledger {}", self.path.display()))?;
            self.valid_len += 1;
        }
        self.needs_newline = false;
        Ok(file)
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Truncated SHA-256 of page text, kept in the ledger as an audit aid.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
