//! CLI command handlers. Each command is in its own file.

mod completions;
mod control;
mod run;
mod status;

use anyhow::{Context, Result};
use bdm_core::config::BdmConfig;
use bdm_core::job::JobIdScheme;
use std::path::PathBuf;

pub use completions::{run_completions, run_man};
pub use control::run_control;
pub use run::{run_batch, RunOptions};
pub use status::run_status;

/// `--dir`, else config `download_dir`, else the current directory.
pub fn resolve_download_dir(cfg: &BdmConfig, dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir.or_else(|| cfg.download_dir.clone()) {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("current directory"),
    }
}

/// `--digest-ids` forces URL digests; otherwise the configured scheme.
pub fn job_id_scheme(cfg: &BdmConfig, digest_ids: bool) -> JobIdScheme {
    if digest_ids {
        JobIdScheme::UrlDigest
    } else {
        cfg.job_ids
    }
}
