//! Launch template for the supervised command

use async_process::{Command as AsyncCommand, Stdio};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::redirector::StreamTarget;

/// What to run, minus the per-launch arguments and streams
///
/// Unlike `async_process::Command` this type is `Clone` and is turned into a
/// fresh launcher command on every start, so the same template can be launched
/// many times with different arguments.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    /// Arguments placed before the per-launch ones
    base_args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
    current_dir: Option<PathBuf>,
}

impl Command {
    /// Create a new template for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            base_args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
        }
    }

    /// Add an argument passed on every launch
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.base_args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments passed on every launch
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set the working directory
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments passed on every launch
    pub fn get_args(&self) -> &[OsString] {
        &self.base_args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Get the working directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Render program and arguments for log lines
    pub fn display_with<S: AsRef<OsStr>>(&self, extra: &[S]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.base_args.iter().map(OsString::as_os_str))
            .chain(extra.iter().map(|arg| -> &OsStr { arg.as_ref() }))
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the launcher command for one start
    ///
    /// `streams` are the resolved stdin, stdout and stderr targets, in that order.
    /// The child is killed if the returned handle is dropped while it still runs.
    pub fn prepare<S: AsRef<OsStr>>(&self, extra: &[S], streams: [StreamTarget; 3]) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.base_args);
        cmd.args(extra);

        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let [stdin, stdout, stderr] = streams;
        cmd.stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        cmd
    }
}
