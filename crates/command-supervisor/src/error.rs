//! Error types for process supervision

use std::path::PathBuf;

use thiserror::Error;

use crate::descriptor::Descriptor;

/// Unified error type for supervision, redirection and artifact allocation
#[derive(Error, Debug)]
pub enum Error {
    /// An artifact path was requested twice within the same run
    #[error("artifact path {} already allocated in this run", path.display())]
    AllocationCollision {
        /// The path that collided
        path: PathBuf,
    },

    /// An artifact name would escape the current directory
    #[error("artifact name {} must be relative and must not contain `..`", name.display())]
    InvalidArtifactName {
        /// The rejected name
        name: PathBuf,
    },

    /// A file redirector was not allowed to open its backing file
    #[error("permission denied opening {} for {descriptor}", path.display())]
    RedirectorPermissionDenied {
        /// The stream the redirector services
        descriptor: Descriptor,
        /// The backing file
        path: PathBuf,
    },

    /// A file redirector reading into stdin found no backing file
    #[error("file {} for {descriptor} does not exist", path.display())]
    RedirectorNotFound {
        /// The stream the redirector services
        descriptor: Descriptor,
        /// The backing file
        path: PathBuf,
    },

    /// Any other I/O failure while opening or closing a redirector's file
    #[error("redirection of {descriptor} through {} failed: {source}", path.display())]
    RedirectorIo {
        /// The stream the redirector services
        descriptor: Descriptor,
        /// The backing file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An operation needed a live process but the executor is idle
    #[error("executor for {command} currently does not own any process")]
    NoProcessOwned {
        /// The command the executor wraps
        command: String,
    },

    /// `start` was called while a previous process is still owned
    #[error("executor for {command} already owns running process {pid}")]
    AlreadyRunning {
        /// The command the executor wraps
        command: String,
        /// The live process id
        pid: u32,
    },

    /// Command not found
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found
        command: String,
    },

    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// One or more redirectors failed to tear down after the process exited
    #[error("{} redirector(s) failed to tear down after exit code {exit_code}", failures.len())]
    Teardown {
        /// Exit code of the process that had finished
        exit_code: i32,
        /// Every teardown failure, in descriptor order
        failures: Vec<Error>,
    },

    /// Invalid supervisor configuration
    #[error("invalid configuration: {reason}")]
    Config {
        /// What is wrong with the configuration
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while opening a redirector's file
    pub(crate) fn redirector(descriptor: Descriptor, path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::RedirectorPermissionDenied { descriptor, path }
            }
            std::io::ErrorKind::NotFound => Self::RedirectorNotFound { descriptor, path },
            _ => Self::RedirectorIo {
                descriptor,
                path,
                source,
            },
        }
    }

    /// Returns true for artifact allocation collisions
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::AllocationCollision { .. })
    }

    /// Returns true when an operation was invalid for the executor's current state
    pub fn is_process_state(&self) -> bool {
        matches!(self, Self::NoProcessOwned { .. } | Self::AlreadyRunning { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
