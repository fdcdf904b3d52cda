//! Control socket: server (during `bdm run`) and client (for `bdm pause` etc.).
//! Protocol: one line per command, `<verb> [index]`, e.g. "pause" or "stop 3".

use anyhow::{bail, Context, Result};
use bdm_core::scheduler::{Scheduler, SchedulerError};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Pause,
    Resume,
    Stop,
    Restart,
}

impl ControlVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlVerb::Pause => "pause",
            ControlVerb::Resume => "resume",
            ControlVerb::Stop => "stop",
            ControlVerb::Restart => "restart",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "pause" => Some(ControlVerb::Pause),
            "resume" => Some(ControlVerb::Resume),
            "stop" => Some(ControlVerb::Stop),
            "restart" => Some(ControlVerb::Restart),
            _ => None,
        }
    }
}

impl fmt::Display for ControlVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One control request: a verb for the whole batch or for the job at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCommand {
    pub verb: ControlVerb,
    pub index: Option<usize>,
}

impl ControlCommand {
    /// Parses one protocol line. Unknown verbs, bad indices and trailing
    /// words yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = ControlVerb::from_word(words.next()?)?;
        let index = match words.next() {
            Some(word) => Some(word.parse().ok()?),
            None => None,
        };
        if words.next().is_some() {
            return None;
        }
        Some(Self { verb, index })
    }

    pub fn to_line(self) -> String {
        match self.index {
            Some(index) => format!("{} {}\n", self.verb, index),
            None => format!("{}\n", self.verb),
        }
    }

    /// Applies the command to `scheduler`. Blocks for restarts, which wait
    /// for workers to drain.
    pub fn apply(self, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        match (self.verb, self.index) {
            (ControlVerb::Pause, None) => scheduler.pause_all(),
            (ControlVerb::Resume, None) => scheduler.resume_all(),
            (ControlVerb::Stop, None) => scheduler.stop_all(),
            (ControlVerb::Restart, None) => return scheduler.restart_all(),
            (ControlVerb::Pause, Some(index)) => {
                scheduler.pause(index);
            }
            (ControlVerb::Resume, Some(index)) => {
                scheduler.resume(index);
            }
            (ControlVerb::Stop, Some(index)) => {
                scheduler.stop(index);
            }
            (ControlVerb::Restart, Some(index)) => return scheduler.restart(index),
        }
        Ok(())
    }
}

/// Spawns a task that listens on `path` and applies each well-formed line to
/// `scheduler`. Malformed lines are logged and ignored. `pending` counts
/// commands still being applied, so `bdm run` does not exit while a restart
/// is between its stop and its start.
pub fn spawn_control_listener(
    scheduler: Scheduler,
    path: impl AsRef<Path>,
    pending: Arc<AtomicUsize>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener =
        UnixListener::bind(&path).with_context(|| format!("bind control socket: {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    let pending = Arc::clone(&pending);
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let Some(command) = ControlCommand::parse_line(&line) else {
                                tracing::debug!("ignoring control line {:?}", line.trim());
                                continue;
                            };
                            handle_command(&scheduler, command, &pending).await;
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn handle_command(scheduler: &Scheduler, command: ControlCommand, pending: &AtomicUsize) {
    tracing::info!("control: {}", command.to_line().trim_end());
    pending.fetch_add(1, Ordering::SeqCst);
    let target = scheduler.clone();
    match tokio::task::spawn_blocking(move || command.apply(&target)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("control {} failed: {}", command.verb, e),
        Err(e) => tracing::warn!("control {} task failed: {}", command.verb, e),
    }
    pending.fetch_sub(1, Ordering::SeqCst);
}

/// Sends one command line to the control socket of a running `bdm run`.
pub async fn send_command(socket_path: &Path, command: ControlCommand) -> Result<()> {
    if !socket_path.exists() {
        bail!("no running batch (control socket {} not found)", socket_path.display());
    }
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    stream.write_all(command.to_line().as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdm_core::transfer::CurlTransport;
    use std::time::Duration;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(CurlTransport::new()))
    }

    #[test]
    fn parse_batch_and_job_commands() {
        assert_eq!(
            ControlCommand::parse_line("pause"),
            Some(ControlCommand {
                verb: ControlVerb::Pause,
                index: None
            })
        );
        assert_eq!(
            ControlCommand::parse_line("  restart 3 \n"),
            Some(ControlCommand {
                verb: ControlVerb::Restart,
                index: Some(3)
            })
        );
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        for line in ["", "cancel 1", "stop x", "stop -1", "pause 1 2", "PAUSE"] {
            assert_eq!(ControlCommand::parse_line(line), None, "{:?}", line);
        }
    }

    #[test]
    fn lines_parse_back() {
        for verb in [ControlVerb::Pause, ControlVerb::Resume, ControlVerb::Stop, ControlVerb::Restart] {
            for index in [None, Some(7)] {
                let command = ControlCommand { verb, index };
                assert_eq!(ControlCommand::parse_line(&command.to_line()), Some(command));
            }
        }
    }

    #[test]
    fn apply_batch_pause_and_resume() {
        let scheduler = scheduler();
        ControlCommand::parse_line("pause").unwrap().apply(&scheduler).unwrap();
        assert!(scheduler.is_paused());
        ControlCommand::parse_line("resume").unwrap().apply(&scheduler).unwrap();
        assert!(!scheduler.is_paused());
        ControlCommand::parse_line("stop 4").unwrap().apply(&scheduler).unwrap();
        assert!(!scheduler.is_stopped());
    }

    #[test]
    fn apply_restart_of_unknown_job_fails() {
        let scheduler = scheduler();
        let err = ControlCommand::parse_line("restart 2")
            .unwrap()
            .apply(&scheduler)
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownJob(2));
    }

    #[tokio::test]
    async fn listener_applies_sent_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let scheduler = scheduler();
        let pending = Arc::new(AtomicUsize::new(0));
        let handle = spawn_control_listener(scheduler.clone(), &path, Arc::clone(&pending)).unwrap();

        let stop = ControlCommand {
            verb: ControlVerb::Stop,
            index: None,
        };
        send_command(&path, stop).await.unwrap();
        let mut waited = 0;
        while !scheduler.is_stopped() && waited < 500 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(scheduler.is_stopped());
        handle.abort();
    }

    #[tokio::test]
    async fn send_without_listener_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = ControlCommand {
            verb: ControlVerb::Pause,
            index: None,
        };
        assert!(send_command(&dir.path().join("missing.sock"), command).await.is_err());
    }
}
