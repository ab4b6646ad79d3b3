//! Per-command output file naming
//!
//! Every invocation of a command gets its stdout and stderr captured under a
//! directory named after the command, as `<n>_stdout` and `<n>_stderr` where
//! `n` counts that command's invocations in this run:
//!
//! ```text
//! <run>/run_artery/1_stdout
//! <run>/run_artery/1_stderr
//! <run>/run_artery/2_stdout
//! ...
//! ```

use std::collections::HashMap;
use std::path::Path;

use crate::artifactory::Artifactory;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::redirector::Redirector;

/// Hands out file redirectors for captured command output
#[derive(Debug, Default)]
pub struct OutputNaming {
    counters: HashMap<String, u32>,
}

impl OutputNaming {
    /// Start with every counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// How many invocations of `cmd` have been named so far
    pub fn invocations(&self, cmd: &str) -> u32 {
        self.counters.get(cmd).copied().unwrap_or(0)
    }

    /// Allocate stdout and stderr files for the next invocation of `cmd`
    ///
    /// The counter only advances when both paths were allocated.
    pub fn output_redirectors(
        &mut self,
        cmd: &str,
        artifactory: &mut Artifactory,
    ) -> Result<[Redirector; 2]> {
        let invocation = self.invocations(cmd) + 1;

        let (stdout, stderr) = {
            let mut scope = artifactory.descend(command_dir_name(cmd)?)?;
            let stdout = scope.add_file(format!("{invocation}_{}", Descriptor::Stdout))?;
            let stderr = scope.add_file(format!("{invocation}_{}", Descriptor::Stderr))?;
            (stdout, stderr)
        };

        self.counters.insert(cmd.to_owned(), invocation);

        Ok([
            Redirector::file(Descriptor::Stdout, stdout),
            Redirector::file(Descriptor::Stderr, stderr),
        ])
    }
}

/// Directory name for `cmd`: the last component when it is a path
fn command_dir_name(cmd: &str) -> Result<&Path> {
    Path::new(cmd)
        .file_name()
        .map(Path::new)
        .ok_or_else(|| Error::InvalidArtifactName { name: cmd.into() })
}
