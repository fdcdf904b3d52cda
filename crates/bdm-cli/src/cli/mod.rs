//! CLI for the BDM batch download manager.

mod commands;
mod control_socket;

use anyhow::Result;
use bdm_core::config::{self, BdmConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_batch, run_completions, run_control, run_man, run_status, RunOptions};
use control_socket::ControlVerb;

/// Top-level CLI for the BDM download manager.
#[derive(Debug, Parser)]
#[command(name = "bdm")]
#[command(about = "BDM: bounded-concurrency batch download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every URL in a list file, a bounded number at a time.
    Run {
        /// File with one URL per line (blank lines and `#` comments are skipped).
        url_file: PathBuf,
        /// Download directory (default: config `download_dir`, else the current directory).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Run up to N downloads at once (default: config `max_concurrency`).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Ignore the resume record and download everything again.
        #[arg(long)]
        fresh: bool,
        /// Identify jobs by a digest of their URL instead of their position.
        #[arg(long)]
        digest_ids: bool,
    },

    /// Pause the running batch, or one job by list index.
    Pause {
        /// Job index in the URL list (whole batch if omitted).
        index: Option<usize>,
    },

    /// Resume the running batch, or one job by list index.
    Resume {
        /// Job index in the URL list (whole batch if omitted).
        index: Option<usize>,
    },

    /// Stop the running batch, or cancel one job by list index.
    Stop {
        /// Job index in the URL list (whole batch if omitted).
        index: Option<usize>,
    },

    /// Restart the running batch, or one job by list index.
    Restart {
        /// Job index in the URL list (whole batch if omitted).
        index: Option<usize>,
    },

    /// Show which URLs of a list are recorded as completed.
    Status {
        /// File with one URL per line.
        url_file: PathBuf,
        /// Download directory holding the resume record.
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Identify jobs by a digest of their URL instead of their position.
        #[arg(long)]
        digest_ids: bool,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print the man page (roff) to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                url_file,
                dir,
                jobs,
                fresh,
                digest_ids,
            } => {
                let cfg = load_config()?;
                let opts = RunOptions {
                    download_dir: commands::resolve_download_dir(&cfg, dir)?,
                    jobs: jobs.unwrap_or(cfg.max_concurrency),
                    job_ids: commands::job_id_scheme(&cfg, digest_ids),
                    url_file,
                    fresh,
                };
                run_batch(&cfg, opts).await?;
            }
            CliCommand::Pause { index } => run_control(ControlVerb::Pause, index).await?,
            CliCommand::Resume { index } => run_control(ControlVerb::Resume, index).await?,
            CliCommand::Stop { index } => run_control(ControlVerb::Stop, index).await?,
            CliCommand::Restart { index } => run_control(ControlVerb::Restart, index).await?,
            CliCommand::Status {
                url_file,
                dir,
                digest_ids,
            } => {
                let cfg = load_config()?;
                let download_dir = commands::resolve_download_dir(&cfg, dir)?;
                run_status(&url_file, &download_dir, commands::job_id_scheme(&cfg, digest_ids))?;
            }
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

fn load_config() -> Result<BdmConfig> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests;
