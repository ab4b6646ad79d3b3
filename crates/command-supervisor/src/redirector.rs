//! Standard stream redirection
//!
//! A [`Redirector`] decides where one of a child's standard streams goes. The
//! variants form a closed set:
//!
//! - [`Redirector::Null`] discards the stream.
//! - [`Redirector::Passthrough`] hands the child this process's own stream,
//!   optionally remapped to a different descriptor.
//! - [`Redirector::File`] reads stdin from, or writes output to, a file.
//!
//! Every redirector is resolved once before launch and torn down once after the
//! process reaches a terminal state. [`RedirectorSet`] holds the three active
//! redirectors of an executor and fans resolution and teardown out concurrently.

use async_process::Stdio;
use futures::future::{join3, join_all};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// What a resolved redirector hands to the launcher
#[derive(Debug)]
pub enum StreamTarget {
    /// Connect the stream to the null device
    Discard,
    /// Inherit the stream from this process
    Inherit,
    /// Use an owned file or duplicated stream handle
    Handle(Stdio),
}

impl From<StreamTarget> for Stdio {
    fn from(target: StreamTarget) -> Self {
        match target {
            StreamTarget::Discard => Stdio::null(),
            StreamTarget::Inherit => Stdio::inherit(),
            StreamTarget::Handle(stdio) => stdio,
        }
    }
}

/// Redirection of a single standard stream
#[derive(Debug)]
pub enum Redirector {
    /// Disable the stream entirely
    Null {
        /// The stream being redirected
        descriptor: Descriptor,
    },
    /// Pass through one of this process's own streams
    Passthrough {
        /// The stream being redirected
        descriptor: Descriptor,
        /// Which of our streams to hand over; `None` means the same one
        redirect_to: Option<Descriptor>,
    },
    /// Read from or write to a file
    File(FileRedirector),
}

impl Redirector {
    /// Discard `descriptor`
    pub fn null(descriptor: Descriptor) -> Self {
        Self::Null { descriptor }
    }

    /// Hand `descriptor` straight through to this process's matching stream
    pub fn passthrough(descriptor: Descriptor) -> Self {
        Self::Passthrough {
            descriptor,
            redirect_to: None,
        }
    }

    /// Hand `descriptor` through to this process's `redirect_to` stream
    pub fn passthrough_to(descriptor: Descriptor, redirect_to: Descriptor) -> Self {
        Self::Passthrough {
            descriptor,
            redirect_to: Some(redirect_to),
        }
    }

    /// Back `descriptor` with the file at `path`
    pub fn file(descriptor: Descriptor, path: impl Into<PathBuf>) -> Self {
        Self::File(FileRedirector::new(descriptor, path))
    }

    /// The stream this redirector services
    pub fn descriptor(&self) -> Descriptor {
        match self {
            Self::Null { descriptor } | Self::Passthrough { descriptor, .. } => *descriptor,
            Self::File(file) => file.descriptor,
        }
    }

    /// The backing file, for file redirectors
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(file) => Some(&file.path),
            _ => None,
        }
    }

    /// Perform any setup and produce the target to launch with
    pub async fn resolve(&mut self) -> Result<StreamTarget> {
        match self {
            Self::Null { .. } => Ok(StreamTarget::Discard),
            Self::Passthrough {
                descriptor,
                redirect_to,
            } => match *redirect_to {
                Some(target) if target != *descriptor => {
                    Ok(StreamTarget::Handle(duplicate_own_stream(target)?))
                }
                _ => Ok(StreamTarget::Inherit),
            },
            Self::File(file) => file.open().await,
        }
    }

    /// Release whatever `resolve` acquired
    ///
    /// Safe to call after a failed resolve, or when nothing was resolved at all.
    pub async fn teardown(&mut self) -> Result<()> {
        match self {
            Self::File(file) => file.close().await,
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn duplicate_own_stream(descriptor: Descriptor) -> Result<Stdio> {
    use std::os::fd::AsFd;

    let owned = match descriptor {
        Descriptor::Stdin => std::io::stdin().as_fd().try_clone_to_owned()?,
        Descriptor::Stdout => std::io::stdout().as_fd().try_clone_to_owned()?,
        Descriptor::Stderr => std::io::stderr().as_fd().try_clone_to_owned()?,
    };
    Ok(Stdio::from(owned))
}

#[cfg(windows)]
fn duplicate_own_stream(descriptor: Descriptor) -> Result<Stdio> {
    use std::os::windows::io::AsHandle;

    let owned = match descriptor {
        Descriptor::Stdin => std::io::stdin().as_handle().try_clone_to_owned()?,
        Descriptor::Stdout => std::io::stdout().as_handle().try_clone_to_owned()?,
        Descriptor::Stderr => std::io::stderr().as_handle().try_clone_to_owned()?,
    };
    Ok(Stdio::from(owned))
}

/// File-backed redirection
///
/// Stdin is opened read-only and the file must exist. Output streams are opened
/// for writing, created if missing and truncated otherwise.
#[derive(Debug)]
pub struct FileRedirector {
    descriptor: Descriptor,
    path: PathBuf,
    handle: Option<File>,
    #[cfg(test)]
    fail_close: Option<std::io::ErrorKind>,
}

impl FileRedirector {
    /// Create a redirector for `descriptor` backed by `path`
    pub fn new(descriptor: Descriptor, path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            path: path.into(),
            handle: None,
            #[cfg(test)]
            fail_close: None,
        }
    }

    /// Make the next close fail with `kind` after releasing the file
    #[cfg(test)]
    pub(crate) fn failing_close(mut self, kind: std::io::ErrorKind) -> Self {
        self.fail_close = Some(kind);
        self
    }

    /// The backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the backing file is held open
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    async fn open(&mut self) -> Result<StreamTarget> {
        let path = self.path.clone();
        let for_read = self.descriptor.is_input();

        let opened = smol::unblock(move || {
            let mut options = OpenOptions::new();
            if for_read {
                options.read(true);
            } else {
                options.write(true).create(true).truncate(true);
            }
            let file = options.open(&path)?;
            let child_end = file.try_clone()?;
            Ok::<_, std::io::Error>((file, child_end))
        })
        .await;

        match opened {
            Ok((file, child_end)) => {
                debug!(descriptor = %self.descriptor, path = %self.path.display(), "opened redirection file");
                self.handle = Some(file);
                Ok(StreamTarget::Handle(Stdio::from(child_end)))
            }
            Err(e) => {
                error!(
                    descriptor = %self.descriptor,
                    path = %self.path.display(),
                    error = %e,
                    "failed to open file for standard descriptor redirection"
                );
                Err(Error::redirector(self.descriptor, self.path.clone(), e))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(file) = self.handle.take() else {
            return Ok(());
        };
        let flush = !self.descriptor.is_input();
        #[cfg(test)]
        let injected = self.fail_close.take();
        #[cfg(not(test))]
        let injected: Option<std::io::ErrorKind> = None;

        smol::unblock(move || {
            // Only regular files can be synced; devices and fifos reject it.
            if flush && file.metadata()?.is_file() {
                file.sync_data()?;
            }
            drop(file);
            match injected {
                Some(kind) => Err(std::io::Error::from(kind)),
                None => Ok::<_, std::io::Error>(()),
            }
        })
        .await
        .map_err(|source| Error::RedirectorIo {
            descriptor: self.descriptor,
            path: self.path.clone(),
            source,
        })?;

        debug!(descriptor = %self.descriptor, path = %self.path.display(), "closed redirection file");
        Ok(())
    }
}

/// The active redirector for each of the three standard streams
///
/// Streams without an explicit override are always [`Redirector::Null`].
#[derive(Debug)]
pub struct RedirectorSet {
    slots: [Redirector; 3],
}

impl Default for RedirectorSet {
    fn default() -> Self {
        Self {
            slots: Descriptor::ALL.map(Redirector::null),
        }
    }
}

impl RedirectorSet {
    /// Create a set with every stream discarded
    pub fn new() -> Self {
        Self::default()
    }

    /// The active redirector for `descriptor`
    pub fn get(&self, descriptor: Descriptor) -> &Redirector {
        &self.slots[descriptor.index()]
    }

    /// Install `redirector` for its own descriptor, returning the one it replaces
    pub fn set(&mut self, redirector: Redirector) -> Redirector {
        let index = redirector.descriptor().index();
        std::mem::replace(&mut self.slots[index], redirector)
    }

    /// Install every override; later entries for the same stream win
    pub fn merge(&mut self, overrides: impl IntoIterator<Item = Redirector>) {
        for redirector in overrides {
            self.set(redirector);
        }
    }

    /// Put every stream back to [`Redirector::Null`]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Iterate over the active redirectors in descriptor order
    pub fn iter(&self) -> impl Iterator<Item = &Redirector> {
        self.slots.iter()
    }

    /// Resolve all three redirectors concurrently
    ///
    /// If any of them fails, every redirector is torn down before the first
    /// failure (in descriptor order) is returned.
    pub async fn resolve_all(&mut self) -> Result<[StreamTarget; 3]> {
        let [stdin, stdout, stderr] = &mut self.slots;
        let resolved = join3(stdin.resolve(), stdout.resolve(), stderr.resolve()).await;

        let first_error = match resolved {
            (Ok(stdin), Ok(stdout), Ok(stderr)) => return Ok([stdin, stdout, stderr]),
            (stdin, stdout, stderr) => [stdin.err(), stdout.err(), stderr.err()]
                .into_iter()
                .flatten()
                .next(),
        };

        for failure in self.teardown_all().await {
            warn!(error = %failure, "teardown after failed resolution also failed");
        }

        Err(first_error.unwrap_or_else(|| Error::spawn_failed("redirector resolution failed")))
    }

    /// Tear down all three redirectors concurrently
    ///
    /// Every teardown is attempted; the failures are returned in descriptor order.
    pub async fn teardown_all(&mut self) -> Vec<Error> {
        join_all(self.slots.iter_mut().map(|redirector| redirector.teardown()))
            .await
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_resolves_to_discard() {
        smol::block_on(async {
            let mut redirector = Redirector::null(Descriptor::Stdout);
            assert!(matches!(
                redirector.resolve().await.unwrap(),
                StreamTarget::Discard
            ));
            redirector.teardown().await.unwrap();
        });
    }

    #[test]
    fn test_passthrough_inherits_own_stream() {
        smol::block_on(async {
            let mut redirector = Redirector::passthrough(Descriptor::Stderr);
            assert!(matches!(
                redirector.resolve().await.unwrap(),
                StreamTarget::Inherit
            ));

            let mut same = Redirector::passthrough_to(Descriptor::Stderr, Descriptor::Stderr);
            assert!(matches!(same.resolve().await.unwrap(), StreamTarget::Inherit));
        });
    }

    #[test]
    fn test_passthrough_remap_duplicates_stream() {
        smol::block_on(async {
            let mut redirector = Redirector::passthrough_to(Descriptor::Stderr, Descriptor::Stdout);
            assert!(matches!(
                redirector.resolve().await.unwrap(),
                StreamTarget::Handle(_)
            ));
            redirector.teardown().await.unwrap();
        });
    }

    #[test]
    fn test_file_write_creates_and_truncates() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out");
            std::fs::write(&path, "stale contents").unwrap();

            let mut redirector = Redirector::file(Descriptor::Stdout, &path);
            let target = redirector.resolve().await.unwrap();
            assert!(matches!(target, StreamTarget::Handle(_)));
            drop(target);
            redirector.teardown().await.unwrap();

            assert_eq!(std::fs::read(&path).unwrap(), b"");
        });
    }

    #[test]
    fn test_file_read_requires_existing_file() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("missing");

            let mut redirector = Redirector::file(Descriptor::Stdin, &path);
            let err = redirector.resolve().await.unwrap_err();
            assert!(matches!(
                err,
                Error::RedirectorNotFound {
                    descriptor: Descriptor::Stdin,
                    ..
                }
            ));

            // Nothing was opened, teardown is still fine
            redirector.teardown().await.unwrap();
            assert!(!path.exists());
        });
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permission_denied_is_distinct() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            // root ignores file modes
            return;
        }

        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("locked");
            std::fs::write(&path, "").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o400)).unwrap();

            let mut redirector = Redirector::file(Descriptor::Stdout, &path);
            let err = redirector.resolve().await.unwrap_err();
            assert!(matches!(err, Error::RedirectorPermissionDenied { .. }));
        });
    }

    #[test]
    fn test_file_teardown_closes_once() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let mut file = FileRedirector::new(Descriptor::Stderr, dir.path().join("err"));

            let _target = file.open().await.unwrap();
            assert!(file.is_open());

            file.close().await.unwrap();
            assert!(!file.is_open());

            // Second close is a no-op
            file.close().await.unwrap();
        });
    }

    #[test]
    fn test_set_defaults_to_null_and_merges() {
        let mut set = RedirectorSet::new();
        assert!(set.iter().all(|r| matches!(r, Redirector::Null { .. })));

        set.merge([
            Redirector::passthrough(Descriptor::Stdout),
            Redirector::file(Descriptor::Stderr, "/tmp/a"),
            Redirector::file(Descriptor::Stderr, "/tmp/b"),
        ]);

        assert!(matches!(set.get(Descriptor::Stdin), Redirector::Null { .. }));
        assert!(matches!(
            set.get(Descriptor::Stdout),
            Redirector::Passthrough { .. }
        ));
        assert_eq!(
            set.get(Descriptor::Stderr).path(),
            Some(Path::new("/tmp/b"))
        );

        set.reset();
        assert!(set.iter().all(|r| matches!(r, Redirector::Null { .. })));
    }

    #[test]
    fn test_resolve_all_tears_down_on_failure() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let mut set = RedirectorSet::new();
            set.merge([
                Redirector::file(Descriptor::Stdin, dir.path().join("missing")),
                Redirector::file(Descriptor::Stdout, dir.path().join("out")),
            ]);

            let err = set.resolve_all().await.unwrap_err();
            assert!(matches!(err, Error::RedirectorNotFound { .. }));

            let Redirector::File(stdout) = set.get(Descriptor::Stdout) else {
                panic!("stdout override lost");
            };
            assert!(!stdout.is_open());
        });
    }

    #[test]
    fn test_teardown_all_attempts_every_redirector() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let mut set = RedirectorSet::new();
            set.merge([
                Redirector::File(
                    FileRedirector::new(Descriptor::Stdout, dir.path().join("out"))
                        .failing_close(std::io::ErrorKind::Other),
                ),
                Redirector::File(
                    FileRedirector::new(Descriptor::Stderr, dir.path().join("err"))
                        .failing_close(std::io::ErrorKind::Other),
                ),
            ]);
            let _streams = set.resolve_all().await.unwrap();

            let failures = set.teardown_all().await;
            assert_eq!(failures.len(), 2);
            assert!(matches!(
                &failures[0],
                Error::RedirectorIo { descriptor: Descriptor::Stdout, .. }
            ));
            assert!(matches!(
                &failures[1],
                Error::RedirectorIo { descriptor: Descriptor::Stderr, .. }
            ));
            assert!(set.iter().all(|r| match r {
                Redirector::File(file) => !file.is_open(),
                _ => true,
            }));
        });
    }
}
