//! Collision-free artifact paths for one test run
//!
//! The artifactory only does path bookkeeping. It never creates files or
//! directories; whoever writes an artifact creates its parent directories.
//!
//! Allocations happen relative to a directory cursor. [`Artifactory::add_directory`]
//! and [`Artifactory::descend`] move the cursor for as long as the returned
//! [`DirectoryScope`] lives and restore it when the scope is dropped, whether
//! the work inside ended normally, returned an error or panicked.
//!
//! The cursor is plain mutable state and needs `&mut` access; sharing one
//! artifactory between tasks requires external synchronisation.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};

/// Allocator of artifact paths under a run-scoped root
#[derive(Debug)]
pub struct Artifactory {
    root: PathBuf,
    current: PathBuf,
    files: HashSet<PathBuf>,
    directories: HashSet<PathBuf>,
}

impl Artifactory {
    /// Allocate beneath `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            current: root.clone(),
            root,
            files: HashSet::new(),
            directories: HashSet::new(),
        }
    }

    /// Allocate beneath `reports_dir/run_id` of the given configuration
    pub fn for_run(config: &SupervisorConfig) -> Self {
        Self::new(config.run_dir())
    }

    /// The root every allocation lives under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the next allocation lands
    pub fn current_dir(&self) -> &Path {
        &self.current
    }

    /// Reserve `name` in the current directory
    ///
    /// Fails with [`Error::AllocationCollision`] if the path was reserved before
    /// or already exists on disk.
    pub fn add_file(&mut self, name: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.child_path(name.as_ref())?;

        if self.files.contains(&path) || self.directories.contains(&path) || path.exists() {
            return Err(Error::AllocationCollision { path });
        }

        debug!(path = %path.display(), "allocated artifact file");
        self.files.insert(path.clone());
        Ok(path)
    }

    /// Enter `name` exclusively until the returned scope is dropped
    ///
    /// Fails with [`Error::AllocationCollision`] if the directory was entered
    /// before in this run or already exists on disk. The cursor is left
    /// untouched on failure.
    pub fn add_directory(&mut self, name: impl AsRef<Path>) -> Result<DirectoryScope<'_>> {
        let path = self.child_path(name.as_ref())?;

        if self.directories.contains(&path) || self.files.contains(&path) || path.exists() {
            return Err(Error::AllocationCollision { path });
        }

        Ok(self.enter(path))
    }

    /// Enter `name` until the returned scope is dropped, allowing re-entry
    ///
    /// Used when the files inside carry their own unique names, such as one
    /// directory shared by every invocation of a command. Still fails if `name`
    /// was reserved as a file or exists on disk as something other than a
    /// directory.
    pub fn descend(&mut self, name: impl AsRef<Path>) -> Result<DirectoryScope<'_>> {
        let path = self.child_path(name.as_ref())?;

        if self.files.contains(&path) || (path.exists() && !path.is_dir()) {
            return Err(Error::AllocationCollision { path });
        }

        Ok(self.enter(path))
    }

    /// Run `f` inside an exclusively entered `name`
    pub fn with_directory<T>(
        &mut self,
        name: impl AsRef<Path>,
        f: impl FnOnce(&mut Artifactory) -> Result<T>,
    ) -> Result<T> {
        let mut scope = self.add_directory(name)?;
        f(&mut scope)
    }

    fn enter(&mut self, path: PathBuf) -> DirectoryScope<'_> {
        debug!(path = %path.display(), "entering artifact directory");
        self.directories.insert(path.clone());
        let parent = std::mem::replace(&mut self.current, path);
        DirectoryScope {
            artifactory: self,
            parent,
        }
    }

    fn child_path(&self, name: &Path) -> Result<PathBuf> {
        let valid = !name.as_os_str().is_empty()
            && name
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !valid {
            return Err(Error::InvalidArtifactName {
                name: name.to_path_buf(),
            });
        }
        Ok(self.current.join(name))
    }
}

/// An entered artifact directory
///
/// Dereferences to the [`Artifactory`] so allocations can continue inside it,
/// including nested scopes. Dropping it moves the cursor back to the parent.
#[derive(Debug)]
pub struct DirectoryScope<'a> {
    artifactory: &'a mut Artifactory,
    parent: PathBuf,
}

impl DirectoryScope<'_> {
    /// The directory this scope entered
    pub fn path(&self) -> &Path {
        &self.artifactory.current
    }
}

impl Deref for DirectoryScope<'_> {
    type Target = Artifactory;

    fn deref(&self) -> &Artifactory {
        self.artifactory
    }
}

impl DerefMut for DirectoryScope<'_> {
    fn deref_mut(&mut self) -> &mut Artifactory {
        self.artifactory
    }
}

impl Drop for DirectoryScope<'_> {
    fn drop(&mut self) {
        self.artifactory.current = std::mem::take(&mut self.parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_twice_collides() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifactory = Artifactory::new(dir.path());

        let first = artifactory.add_file("log").unwrap();
        assert_eq!(first, dir.path().join("log"));

        let err = artifactory.add_file("log").unwrap_err();
        assert!(matches!(err, Error::AllocationCollision { ref path } if *path == first));
    }

    #[test]
    fn test_add_file_never_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("results.db"), "keep me").unwrap();

        let mut artifactory = Artifactory::new(dir.path());
        assert!(artifactory.add_file("results.db").unwrap_err().is_collision());
    }

    #[test]
    fn test_directory_scope_restores_cursor() {
        let mut artifactory = Artifactory::new("/reports");

        {
            let mut scope = artifactory.add_directory("run").unwrap();
            assert_eq!(scope.path(), Path::new("/reports/run"));
            assert_eq!(scope.add_file("a").unwrap(), Path::new("/reports/run/a"));

            let mut nested = scope.add_directory("inner").unwrap();
            assert_eq!(nested.add_file("a").unwrap(), Path::new("/reports/run/inner/a"));
        }

        assert_eq!(artifactory.current_dir(), Path::new("/reports"));
    }

    #[test]
    fn test_cursor_restored_when_body_fails() {
        let mut artifactory = Artifactory::new("/reports");
        let before = artifactory.current_dir().to_path_buf();

        let result: Result<()> = artifactory.with_directory("cmd", |inner| {
            inner.add_file("dup")?;
            inner.add_file("dup")?;
            Ok(())
        });

        assert!(result.unwrap_err().is_collision());
        assert_eq!(artifactory.current_dir(), before);
    }

    #[test]
    fn test_cursor_untouched_when_entry_collides() {
        let mut artifactory = Artifactory::new("/reports");
        drop(artifactory.add_directory("cmd").unwrap());

        assert!(artifactory.add_directory("cmd").unwrap_err().is_collision());
        assert_eq!(artifactory.current_dir(), Path::new("/reports"));
    }

    #[test]
    fn test_sibling_scopes_reuse_relative_names() {
        let mut artifactory = Artifactory::new("/reports");

        let a = artifactory
            .with_directory("first", |inner| inner.add_file("stdout"))
            .unwrap();
        let b = artifactory
            .with_directory("second", |inner| inner.add_file("stdout"))
            .unwrap();

        assert_eq!(a, Path::new("/reports/first/stdout"));
        assert_eq!(b, Path::new("/reports/second/stdout"));
    }

    #[test]
    fn test_descend_allows_reentry() {
        let mut artifactory = Artifactory::new("/reports");

        let first = artifactory.descend("cmd").unwrap().add_file("1_stdout").unwrap();
        let second = artifactory.descend("cmd").unwrap().add_file("2_stdout").unwrap();

        assert_eq!(first, Path::new("/reports/cmd/1_stdout"));
        assert_eq!(second, Path::new("/reports/cmd/2_stdout"));
        assert_eq!(artifactory.current_dir(), Path::new("/reports"));

        // A shared directory can no longer be claimed exclusively
        assert!(artifactory.add_directory("cmd").unwrap_err().is_collision());
    }

    #[test]
    fn test_file_and_directory_names_do_not_mix() {
        let mut artifactory = Artifactory::new("/reports");
        artifactory.add_file("thing").unwrap();

        assert!(artifactory.add_directory("thing").unwrap_err().is_collision());
        assert!(artifactory.descend("thing").unwrap_err().is_collision());
    }

    #[test]
    fn test_escaping_names_are_rejected() {
        let mut artifactory = Artifactory::new("/reports");

        for name in ["../etc", "/abs", "", "a/../b"] {
            let err = artifactory.add_file(name).unwrap_err();
            assert!(matches!(err, Error::InvalidArtifactName { .. }), "{name}");
        }
    }
}
