//! Finished-process types

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Flatten into a single integer code
    ///
    /// A normal exit yields its code. A process killed by a signal yields the
    /// negated signal number, so SIGKILL reports `-9`.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.code {
            return code;
        }
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal {
                return -signal;
            }
        }
        -1
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

/// A process that has exited and been reaped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedProcess {
    command: String,
    pid: u32,
    status: ExitStatus,
}

impl FinishedProcess {
    pub(crate) fn new(command: String, pid: u32, status: ExitStatus) -> Self {
        Self {
            command,
            pid,
            status,
        }
    }

    /// The command line the process was launched with
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The id the process ran under
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// How the process ended
    pub fn status(&self) -> ExitStatus {
        self.status
    }
}

/// Outcome of a terminal wait: the finished process and its exit code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessMeta {
    /// The reaped process
    pub process: FinishedProcess,
    /// See [`ExitStatus::exit_code`]
    pub exit_code: i32,
}

impl SubprocessMeta {
    pub(crate) fn new(process: FinishedProcess) -> Self {
        let exit_code = process.status.exit_code();
        Self { process, exit_code }
    }

    /// Returns true if the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
