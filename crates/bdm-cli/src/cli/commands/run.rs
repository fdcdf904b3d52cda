//! `bdm run <url-file>` – download a URL list with a bounded number of workers.

use anyhow::{bail, Result};
use bdm_core::config::BdmConfig;
use bdm_core::job::{JobId, JobIdScheme};
use bdm_core::resume_record::ResumeRecord;
use bdm_core::scheduler::{
    BatchConfig, JobState, ProgressStats, Scheduler, SchedulerError, SchedulerOptions,
};
use bdm_core::transfer::CurlTransport;
use bdm_core::url_model::read_url_list;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::control_socket;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Resolved `bdm run` arguments (CLI flags over config).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub url_file: PathBuf,
    pub download_dir: PathBuf,
    pub jobs: usize,
    pub fresh: bool,
    pub job_ids: JobIdScheme,
}

pub async fn run_batch(cfg: &BdmConfig, opts: RunOptions) -> Result<()> {
    let urls = read_url_list(&opts.url_file)?;
    if urls.is_empty() {
        println!("No URLs in {}.", opts.url_file.display());
        return Ok(());
    }

    let record_path = ResumeRecord::default_path(&opts.download_dir);
    let completed = if opts.fresh {
        ResumeRecord::remove_at(&record_path)?;
        Vec::new()
    } else {
        load_completed(&record_path)
    };

    let transport = Arc::new(CurlTransport::with_connect_timeout(Duration::from_secs(
        cfg.connect_timeout_secs,
    )));
    let scheduler = Scheduler::with_options(
        transport,
        SchedulerOptions {
            chunk_size: cfg.chunk_size_bytes.max(1),
            job_id_fn: opts.job_ids.id_fn(),
            ..SchedulerOptions::default()
        },
    );
    scheduler.configure(BatchConfig {
        urls,
        completed_ids: completed,
        destination_dir: opts.download_dir.clone(),
        max_concurrency: opts.jobs,
    })?;

    let pending = Arc::new(AtomicUsize::new(0));
    let socket_path = bdm_core::control::default_control_socket_path().ok();
    let listener = socket_path.as_ref().and_then(|path| {
        match control_socket::spawn_control_listener(scheduler.clone(), path, Arc::clone(&pending)) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        }
    });

    let outcome = drive(&scheduler, &record_path, &pending).await;

    if let Some(handle) = listener {
        handle.abort();
    }
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }
    save_record(&record_path, &scheduler.completed_ids());
    let interrupted = outcome?;

    let stats = scheduler.progress();
    print_progress(&stats);
    println!();
    let failed = report_failures(&scheduler);
    println!(
        "{} of {} downloaded, {} failed, {:.1} MiB in {:.1}s",
        stats.jobs_done,
        stats.job_count,
        failed,
        stats.bytes_done as f64 / 1_048_576.0,
        stats.elapsed_secs
    );
    if interrupted {
        println!("Interrupted; run again to continue.");
    } else if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    Ok(())
}

/// Starts the batch and ticks until it finishes or Ctrl-C stops it.
/// Returns whether the run was interrupted.
async fn drive(scheduler: &Scheduler, record_path: &Path, pending: &AtomicUsize) -> Result<bool> {
    match scheduler.start_all() {
        Ok(()) => {}
        Err(SchedulerError::NoJobs) => return Ok(false),
        Err(e) => return Err(e.into()),
    }

    let mut saved = scheduler.completed_ids();
    let mut ticker = tokio::time::interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print_progress(&scheduler.progress());
                let completed = scheduler.completed_ids();
                if completed != saved {
                    save_record(record_path, &completed);
                    saved = completed;
                }
                if scheduler.is_finished() && pending.load(Ordering::SeqCst) == 0 {
                    return Ok(false);
                }
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::warn!("Ctrl-C handler: {}", e);
                }
                println!();
                println!("Stopping downloads...");
                let stopping = scheduler.clone();
                tokio::task::spawn_blocking(move || {
                    stopping.stop_all();
                    stopping.wait_idle();
                })
                .await?;
                return Ok(true);
            }
        }
    }
}

fn load_completed(record_path: &Path) -> Vec<JobId> {
    match ResumeRecord::load_from_path(record_path) {
        Ok(Some(record)) => {
            tracing::info!(
                "resuming: {} job(s) already completed per {}",
                record.completed.len(),
                record_path.display()
            );
            record.completed_ids()
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!("ignoring resume record: {:#}", e);
            Vec::new()
        }
    }
}

fn save_record(record_path: &Path, completed: &BTreeSet<JobId>) {
    if let Err(e) = ResumeRecord::new(completed.clone()).save_to_path(record_path) {
        tracing::warn!("could not save resume record: {:#}", e);
    }
}

/// Redraws the progress line in place.
fn print_progress(stats: &ProgressStats) {
    print!("\r{}", progress_line(stats));
    let _ = io::stdout().flush();
}

fn progress_line(stats: &ProgressStats) -> String {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
    format!(
        "  {}/{} done  {} active  {:.1} MiB  {:.2} MiB/s  ",
        stats.jobs_done, stats.job_count, stats.active, done_mib, rate_mib
    )
}

/// Prints one line per failed job and returns how many there were.
fn report_failures(scheduler: &Scheduler) -> usize {
    let mut failed = 0;
    for index in 0..scheduler.job_count() {
        let Some(status) = scheduler.job_status(index) else {
            continue;
        };
        if status.state == JobState::Failed {
            failed += 1;
            println!(
                "  failed [{}] {}: {}",
                index,
                status.url,
                status.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    failed
}
