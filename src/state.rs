// Persisted automation state
//
// Loaded as a snapshot at run start, mutated only in memory, and written back
// via temp-file-then-rename so a killed run never leaves a partial file.
// Older state shapes are migrated in place on load rather than rejected.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::RunError;

pub const STATE_VERSION: u32 = 2;

/// Bound on stored example excerpts per pattern.
pub const MAX_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternOrigin {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Lowercase keywords used to match this pattern against session text.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty: Option<u8>,
    #[serde(default)]
    pub origin: PatternOrigin,
}

impl Pattern {
    /// Replace stored examples with fresh ones, keeping the bound.
    pub fn refresh_examples(&mut self, examples: &[String]) {
        if examples.is_empty() {
            return;
        }
        self.examples = examples.iter().take(MAX_EXAMPLES).cloned().collect();
    }

    /// Top up examples without evicting existing ones.
    pub fn fill_examples(&mut self, extra: &[String]) {
        for example in extra {
            if self.examples.len() >= MAX_EXAMPLES {
                break;
            }
            if !self.examples.contains(example) {
                self.examples.push(example.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationState {
    pub version: u32,
    pub session_progress: BTreeMap<String, i64>,
    pub patterns: BTreeMap<String, Pattern>,
}

impl Default for AutomationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            session_progress: BTreeMap::new(),
            patterns: BTreeMap::new(),
        }
    }
}

/// Raw on-disk shape, tolerant of the legacy v1 layout (`sessions` key,
/// patterns without origin/novelty fields).
#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    session_progress: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    sessions: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    patterns: BTreeMap<String, Pattern>,
}

impl AutomationState {
    /// Load state from disk. A missing file yields the default empty state;
    /// a legacy-shape file is migrated in memory (persisted on the next save).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no state file at {}, starting fresh", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading state {}", path.display()))
            }
        };

        let raw: RawState = serde_json::from_str(&contents)
            .with_context(|| format!("parsing state {}", path.display()))?;

        let migrated = raw.version.unwrap_or(1) < STATE_VERSION;
        let session_progress = raw
            .session_progress
            .or(raw.sessions)
            .unwrap_or_default();

        if migrated {
            tracing::info!(
                "migrating state {} from v{} to v{}",
                path.display(),
                raw.version.unwrap_or(1),
                STATE_VERSION
            );
        }

        Ok(Self {
            version: STATE_VERSION,
            session_progress,
            patterns: raw.patterns,
        })
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// target. The rename is the commit point.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("creating state directory {}", parent.display())
                })?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("serializing state")?;
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("creating temp state {}", tmp.display()))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.write_all(b"\n"))
                .with_context(|| format!("writing temp state {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("syncing temp state {}", tmp.display()))?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("committing state {}", path.display()))?;
        Ok(())
    }

    /// Advance a session's last-processed timestamp. Progress is monotonic:
    /// an older timestamp never regresses the stored value.
    pub fn advance_session(&mut self, id: &str, last_seen: i64) {
        let entry = self.session_progress.entry(id.to_string()).or_insert(last_seen);
        if last_seen > *entry {
            *entry = last_seen;
        }
    }
}

/// Exclusive advisory lock keyed to the state path. Held for the run's
/// duration; released when dropped.
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn acquire(state_path: &Path) -> Result<Self, RunError> {
        let path = lock_path(state_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating lock directory {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening lock file {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("acquired lock {}", path.display());
                Ok(Self { file, path })
            }
            Err(_) => Err(RunError::LockHeld { path }),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(state_path: &Path) -> PathBuf {
    let mut name = state_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(".lock");
    state_path.with_file_name(name)
}
