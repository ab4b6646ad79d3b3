//! Single-process supervisor
//!
//! An [`AsyncExecutor`] wraps one command and owns at most one live process of
//! it at a time. The life cycle is:
//!
//! ```text
//! Idle --start ok--> Running --terminal wait / wait_and_kill--> Idle
//! Idle --start err--> Idle
//! Running --wait timed out--> Running
//! ```
//!
//! Redirectors are resolved concurrently right before launch and torn down
//! concurrently right after the process has been reaped. All state changes
//! happen through `&mut self`, so one task drives an executor at a time.

use async_process::Child;
use smol::Timer;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::{ExitStatus, FinishedProcess, SubprocessMeta};
use crate::redirector::{Redirector, RedirectorSet};

/// Timeout used by callers that do not pick one
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// The process an executor currently owns
struct LiveProcess {
    child: Child,
    pid: u32,
    command_line: String,
}

/// Supervises one external process at a time
pub struct AsyncExecutor {
    command: Command,
    process: Option<LiveProcess>,
    redirectors: RedirectorSet,
}

impl AsyncExecutor {
    /// Create an executor for `program`
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Create an executor from a prepared command template
    pub fn from_command(command: Command) -> Self {
        Self {
            command,
            process: None,
            redirectors: RedirectorSet::new(),
        }
    }

    /// Set an environment variable for every launch
    pub fn with_env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.command.env(key, val);
        self
    }

    /// Launch every process in `dir`
    pub fn with_current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Arguments placed before the ones given to [`start`](Self::start)
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command.args(args);
        self
    }

    /// The wrapped command template
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Id of the owned process, if any
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|live| live.pid)
    }

    /// Returns true while a process is owned
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// The currently active redirectors
    pub fn redirectors(&self) -> &RedirectorSet {
        &self.redirectors
    }

    fn name(&self) -> String {
        self.command.get_program().to_string_lossy().into_owned()
    }

    fn live_mut(&mut self) -> Result<&mut LiveProcess> {
        match self.process.as_mut() {
            Some(live) => Ok(live),
            None => Err(Error::NoProcessOwned {
                command: self.command.get_program().to_string_lossy().into_owned(),
            }),
        }
    }

    /// Launch the command with `args`
    ///
    /// `overrides` replace the default null redirector of their own stream.
    /// All three redirectors are resolved concurrently before the process is
    /// spawned. On any failure every redirector is torn down and the executor
    /// stays idle.
    pub async fn start<I, S>(
        &mut self,
        overrides: impl IntoIterator<Item = Redirector>,
        args: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if let Some(live) = &self.process {
            return Err(Error::AlreadyRunning {
                command: self.name(),
                pid: live.pid,
            });
        }

        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        self.redirectors.merge(overrides);

        let streams = match self.redirectors.resolve_all().await {
            Ok(streams) => streams,
            Err(e) => {
                self.redirectors.reset();
                return Err(e);
            }
        };

        let command_line = self.command.display_with(&args);
        info!(command = %command_line, "starting up command");

        // The launcher command, and with it the parent's copies of the child
        // streams, is dropped at the end of this statement.
        let spawned = self.command.prepare(&args, streams).spawn();

        match spawned {
            Ok(child) => {
                let pid = child.id();
                debug!(command = %command_line, pid, "process launched");
                self.process = Some(LiveProcess {
                    child,
                    pid,
                    command_line,
                });
                Ok(())
            }
            Err(e) => {
                for failure in self.redirectors.teardown_all().await {
                    warn!(error = %failure, "teardown after failed launch also failed");
                }
                self.redirectors.reset();

                if e.kind() == std::io::ErrorKind::NotFound {
                    Err(Error::CommandNotFound {
                        command: self.name(),
                    })
                } else {
                    Err(Error::spawn_failed(format!(
                        "Failed to spawn {}: {}",
                        command_line, e
                    )))
                }
            }
        }
    }

    /// Wait up to `timeout` for the owned process to exit
    ///
    /// `None` waits without limit. On exit the redirectors are torn down, the
    /// executor returns to idle and the finished process is returned. When the
    /// timeout expires first, `Ok(None)` is returned and the process stays owned.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<SubprocessMeta>> {
        match self.await_exit(timeout).await? {
            Some(status) => self.cleanup(status).await.map(Some),
            None => Ok(None),
        }
    }

    /// Wait up to `timeout`, then kill the process and wait for it to die
    pub async fn wait_and_kill(&mut self, timeout: Option<Duration>) -> Result<SubprocessMeta> {
        if let Some(meta) = self.wait(timeout).await? {
            return Ok(meta);
        }

        self.kill()?;

        // SIGKILL cannot be ignored, so this wait ends
        let status = self.exit_status().await?;
        self.cleanup(status).await
    }

    /// Forcibly kill the owned process
    ///
    /// This does not reap the process; a subsequent wait does.
    pub fn kill(&mut self) -> Result<()> {
        let live = self.live_mut()?;
        warn!(command = %live.command_line, pid = live.pid, "forcibly killing process");

        if let Err(e) = live.child.kill() {
            // Lost the race against a process that exited on its own
            if let Ok(Some(_)) = live.child.try_status() {
                return Ok(());
            }
            return Err(Error::signal_failed(9, e.to_string()));
        }
        Ok(())
    }

    /// Ask the owned process to shut down with SIGTERM
    #[cfg(unix)]
    pub fn terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let live = self.live_mut()?;
        info!(command = %live.command_line, pid = live.pid, "terminating process");

        signal::kill(Pid::from_raw(live.pid as i32), Signal::SIGTERM)
            .map_err(|e| Error::signal_failed(15, e.to_string()))
    }

    async fn await_exit(&mut self, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
        let Some(limit) = timeout else {
            return self.exit_status().await.map(Some);
        };

        let live = self.live_mut()?;
        debug!(command = %live.command_line, timeout = ?limit, "awaiting process to finish");

        let exited = smol::future::or(async { Some(live.child.status().await) }, async {
            Timer::after(limit).await;
            None
        })
        .await;

        match exited {
            Some(status) => {
                let status = status.map_err(|e| {
                    Error::spawn_failed(format!("Failed to wait for process: {}", e))
                })?;
                Ok(Some(status.into()))
            }
            None => {
                warn!(
                    command = %live.command_line,
                    timeout = ?limit,
                    "reached timeout, process still running"
                );
                Ok(None)
            }
        }
    }

    async fn exit_status(&mut self) -> Result<ExitStatus> {
        let live = self.live_mut()?;
        debug!(command = %live.command_line, "awaiting process to finish without timeout");

        let status = live
            .child
            .status()
            .await
            .map_err(|e| Error::spawn_failed(format!("Failed to wait for process: {}", e)))?;
        Ok(status.into())
    }

    /// Release the reaped process and every redirector
    async fn cleanup(&mut self, status: ExitStatus) -> Result<SubprocessMeta> {
        let live = self.process.take().ok_or_else(|| Error::NoProcessOwned {
            command: self.name(),
        })?;

        let failures = self.redirectors.teardown_all().await;
        self.redirectors.reset();

        let meta = SubprocessMeta::new(FinishedProcess::new(live.command_line, live.pid, status));
        debug!(
            command = %meta.process.command(),
            exit_code = meta.exit_code,
            "process finished"
        );

        if failures.is_empty() {
            Ok(meta)
        } else {
            Err(Error::Teardown {
                exit_code: meta.exit_code,
                failures,
            })
        }
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        if let Some(live) = &self.process {
            // The child was spawned with kill_on_drop
            warn!(
                command = %live.command_line,
                pid = live.pid,
                "executor dropped while owning a process, killing it"
            );
        }
    }
}
