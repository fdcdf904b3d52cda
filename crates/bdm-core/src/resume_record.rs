//! Completed-job record kept next to the downloads so a later run skips them.
//!
//! Stored as `<download dir>/.bdm-completed.json`:
//! `{"version": 1, "completed": [0, 3, 4]}`. Writes go through a temp file in
//! the same directory and are renamed into place, so a crash mid-save leaves
//! the previous record intact.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// File name of the record inside the download directory.
pub const DEFAULT_RECORD_NAME: &str = ".bdm-completed.json";

const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub version: u32,
    pub completed: BTreeSet<JobId>,
}

impl Default for ResumeRecord {
    fn default() -> Self {
        Self::new(BTreeSet::new())
    }
}

impl ResumeRecord {
    pub fn new(completed: BTreeSet<JobId>) -> Self {
        Self {
            version: RECORD_VERSION,
            completed,
        }
    }

    pub fn default_path(download_dir: &Path) -> PathBuf {
        download_dir.join(DEFAULT_RECORD_NAME)
    }

    /// Completed ids in the shape `BatchConfig::completed_ids` takes.
    pub fn completed_ids(&self) -> Vec<JobId> {
        self.completed.iter().copied().collect()
    }

    /// Loads the record. A missing file is `Ok(None)`; an unreadable or
    /// malformed one is an error so the caller can decide to start fresh.
    pub fn load_from_path(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read resume record: {}", path.display())),
        };
        let record: ResumeRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse resume record: {}", path.display()))?;
        if record.version != RECORD_VERSION {
            bail!(
                "resume record {} has version {}, expected {}",
                path.display(),
                record.version,
                RECORD_VERSION
            );
        }
        Ok(Some(record))
    }

    /// Saves atomically (temp file in the same directory, then rename).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
        let json = serde_json::to_vec_pretty(self).context("serialize resume record")?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("create temp file in {}", parent.display()))?;
        tmp.write_all(&json).context("write resume record")?;
        tmp.as_file().sync_all().context("sync resume record")?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("write resume record: {}", path.display()))?;
        Ok(())
    }

    /// Removes the record if present.
    pub fn remove_at(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove resume record: {}", path.display())),
        }
    }
}
