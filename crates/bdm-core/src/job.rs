//! Job identity and destination derivation.
//!
//! Both are strategy functions handed to the scheduler rather than baked into
//! it, so a batch can key jobs by list position (the default) or by content
//! without touching the scheduling logic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::url_model::last_path_segment;

/// Stable job identifier.
pub type JobId = u64;

/// Derives a job id from `(index, url list)`. Must be deterministic.
pub type JobIdFn = Arc<dyn Fn(usize, &[String]) -> JobId + Send + Sync>;

/// Derives the destination file from `(download dir, url)`.
pub type DestinationFn = Arc<dyn Fn(&Path, &str) -> PathBuf + Send + Sync>;

/// One URL-to-file transfer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub index: usize,
    pub url: String,
    pub destination: PathBuf,
}

/// Default identity: the position in the URL list.
pub fn positional_job_id(index: usize, _urls: &[String]) -> JobId {
    index as JobId
}

/// Content-derived identity: first 8 bytes (big-endian) of SHA-256 of the URL.
/// Survives reordering of the list; duplicate URLs share one id.
pub fn url_digest_job_id(index: usize, urls: &[String]) -> JobId {
    let url = urls.get(index).map(String::as_str).unwrap_or_default();
    let digest = Sha256::digest(url.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    JobId::from_be_bytes(prefix)
}

/// Default destination: `dir` joined with the last path segment of `url`.
pub fn default_destination(dir: &Path, url: &str) -> PathBuf {
    dir.join(last_path_segment(url))
}

/// Named job id strategies selectable from config and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobIdScheme {
    #[default]
    Positional,
    UrlDigest,
}

impl JobIdScheme {
    pub fn id_fn(self) -> JobIdFn {
        match self {
            JobIdScheme::Positional => Arc::new(positional_job_id),
            JobIdScheme::UrlDigest => Arc::new(url_digest_job_id),
        }
    }
}
