//! Runtime-agnostic supervision of external test processes
//!
//! This crate launches one subprocess at a time, bounds how long it may run,
//! escalates to a forced kill and cleans up afterwards. Each of the child's
//! standard streams is routed through a [`Redirector`], and captured output
//! files are named by an [`Artifactory`] so no run ever overwrites another.
//!
//! # Example
//!
//! ```no_run
//! use command_supervisor::{Artifactory, AsyncExecutor, OutputNaming};
//! use std::time::Duration;
//!
//! # fn main() -> command_supervisor::Result<()> {
//! smol::block_on(async {
//!     let mut artifactory = Artifactory::new("/tmp/reports/run-1");
//!     let mut naming = OutputNaming::new();
//!
//!     let mut executor = AsyncExecutor::new("echo");
//!     let outputs = naming.output_redirectors("echo", &mut artifactory)?;
//!     for output in &outputs {
//!         if let Some(dir) = output.path().and_then(|p| p.parent()) {
//!             std::fs::create_dir_all(dir)?;
//!         }
//!     }
//!
//!     executor.start(outputs, ["hello"]).await?;
//!     let meta = executor.wait_and_kill(Some(Duration::from_secs(5))).await?;
//!     assert_eq!(meta.exit_code, 0);
//!     Ok::<_, command_supervisor::Error>(())
//! })
//! # }
//! ```

#![warn(missing_docs)]

pub mod artifactory;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod naming;
pub mod process;
pub mod redirector;

pub use artifactory::{Artifactory, DirectoryScope};
pub use command::Command;
pub use config::SupervisorConfig;
pub use descriptor::Descriptor;
pub use error::{Error, Result};
pub use executor::{AsyncExecutor, DEFAULT_WAIT_TIMEOUT};
pub use naming::OutputNaming;
pub use process::{ExitStatus, FinishedProcess, SubprocessMeta};
pub use redirector::{FileRedirector, Redirector, RedirectorSet, StreamTarget};
