//! Pinned source checkout.
//!
//! [`RevisionSource`] owns the single checked-out source tree that every
//! architecture builds from. Checkout is idempotent and single-flight: the
//! first [`RevisionSource::ensure`] clones or moves the tree to the pinned
//! tag, later calls hand out the confirmed [`SourceTree`] without touching
//! the disk again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::runner::{CommandOutput, CommandRunner, ToolCommand};
use crate::types::BuildError;

/// What git prints when a checkout would clobber local files.
const OVERWRITE_REFUSAL: &str = "would be overwritten by checkout";

/// Where the library lives upstream and which tag to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    /// Clone URI of the upstream repository.
    pub uri: String,
    /// Directory name of the checkout inside the work directory.
    pub local_directory_name: String,
    /// Tag the checkout must land on.
    pub pinned_tag: String,
}

impl RepositorySpec {
    pub fn new(
        uri: impl Into<String>,
        local_directory_name: impl Into<String>,
        pinned_tag: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            local_directory_name: local_directory_name.into(),
            pinned_tag: pinned_tag.into(),
        }
    }
}

/// Confirmed handle on a checked-out source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub path: PathBuf,
    pub tag: String,
    /// Commit the pinned tag resolved to.
    pub commit: String,
}

impl SourceTree {
    /// Path of the configure script at the top of the tree.
    pub fn configure_script(&self) -> PathBuf {
        self.path.join("configure")
    }
}

/// What to do when moving to the tag would discard local modifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutPolicy {
    /// Discard tracked modifications instead of failing.
    pub force: bool,
}

/// Idempotent, single-flight checkout of a [`RepositorySpec`].
#[derive(Debug)]
pub struct RevisionSource {
    spec: RepositorySpec,
    work_dir: PathBuf,
    policy: CheckoutPolicy,
    confirmed: Mutex<Option<SourceTree>>,
}

impl RevisionSource {
    /// Creates a source rooted in `work_dir`
    pub fn new(spec: RepositorySpec, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            work_dir: work_dir.into(),
            policy: CheckoutPolicy::default(),
            confirmed: Mutex::new(None),
        }
    }

    /// Sets the dirty-tree policy
    pub fn policy(mut self, policy: CheckoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spec(&self) -> &RepositorySpec {
        &self.spec
    }

    /// Location of the checkout on disk.
    pub fn path(&self) -> PathBuf {
        self.work_dir.join(&self.spec.local_directory_name)
    }

    /// Returns the confirmed source tree, checking it out on first use.
    ///
    /// Concurrent callers block on the same checkout; only one runs.
    pub fn ensure(&self, runner: &dyn CommandRunner) -> Result<SourceTree, BuildError> {
        let mut confirmed = self
            .confirmed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tree) = confirmed.as_ref() {
            return Ok(tree.clone());
        }
        let tree = self.checkout(runner)?;
        *confirmed = Some(tree.clone());
        Ok(tree)
    }

    /// Brings the on-disk tree to the pinned tag.
    ///
    /// - Missing directory: clone, then detach at the tag.
    /// - Existing directory at the tag: nothing to do.
    /// - Existing directory elsewhere: fetch if the tag is unknown locally,
    ///   refuse if tracked files are modified (unless forced), then detach
    ///   at the tag.
    ///
    /// Untracked files are not inspected up front, since build products live
    /// there. If git refuses the checkout because one would be overwritten,
    /// that is reported as [`BuildError::DirtyWorkingTree`] as well.
    pub fn checkout(&self, runner: &dyn CommandRunner) -> Result<SourceTree, BuildError> {
        let path = self.path();

        if !path.exists() {
            info!(uri = %self.spec.uri, path = %path.display(), "cloning repository");
            fs::create_dir_all(&self.work_dir)?;
            let clone = ToolCommand::new("git")
                .args(["clone", "--quiet"])
                .arg(self.spec.uri.as_str())
                .path_arg(&path)
                .current_dir(&self.work_dir);
            self.git(runner, &clone)?;
        }

        let commit = match self.resolve_tag(runner, &path)? {
            Some(commit) => commit,
            None => {
                info!(tag = %self.spec.pinned_tag, "tag not present locally, fetching");
                let fetch = ToolCommand::new("git")
                    .args(["fetch", "--quiet", "--tags", "origin"])
                    .current_dir(&path);
                self.git(runner, &fetch)?;
                self.resolve_tag(runner, &path)?
                    .ok_or_else(|| BuildError::TagNotFound {
                        uri: self.spec.uri.clone(),
                        tag: self.spec.pinned_tag.clone(),
                    })?
            }
        };

        let head = self.head(runner, &path)?;
        if head == commit {
            debug!(tag = %self.spec.pinned_tag, %commit, "source already at pinned tag");
        } else {
            let changes = self.local_changes(runner, &path)?;
            if !changes.is_empty() && !self.policy.force {
                return Err(BuildError::DirtyWorkingTree { path, changes });
            }

            info!(tag = %self.spec.pinned_tag, %commit, "checking out pinned tag");
            let mut checkout = ToolCommand::new("git").args(["checkout", "--quiet"]);
            if self.policy.force {
                checkout = checkout.arg("--force");
            }
            let checkout = checkout
                .args(["--detach", commit.as_str()])
                .current_dir(&path);
            let output = self.spawn(runner, &checkout)?;
            if !output.success && output.combined().contains(OVERWRITE_REFUSAL) {
                return Err(BuildError::DirtyWorkingTree {
                    path,
                    changes: output.combined().trim_end().to_string(),
                });
            }
            if !output.success {
                return Err(BuildError::CheckoutFailed {
                    tag: self.spec.pinned_tag.clone(),
                    output: output.combined(),
                });
            }
        }

        Ok(SourceTree {
            path,
            tag: self.spec.pinned_tag.clone(),
            commit,
        })
    }

    /// Resolves the pinned tag to a commit, `None` when the tag is unknown.
    fn resolve_tag(
        &self,
        runner: &dyn CommandRunner,
        path: &Path,
    ) -> Result<Option<String>, BuildError> {
        let cmd = ToolCommand::new("git")
            .args(["rev-parse", "--quiet", "--verify"])
            .arg(format!("refs/tags/{}^{{commit}}", self.spec.pinned_tag))
            .current_dir(path);
        let output = self.spawn(runner, &cmd)?;
        let commit = output.stdout.trim();
        Ok((output.success && !commit.is_empty()).then(|| commit.to_string()))
    }

    fn head(&self, runner: &dyn CommandRunner, path: &Path) -> Result<String, BuildError> {
        let cmd = ToolCommand::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(path);
        let output = self.git(runner, &cmd)?;
        Ok(output.stdout.trim().to_string())
    }

    /// Tracked modifications, in porcelain format. Build products are untracked.
    fn local_changes(&self, runner: &dyn CommandRunner, path: &Path) -> Result<String, BuildError> {
        let cmd = ToolCommand::new("git")
            .args(["status", "--porcelain", "--untracked-files=no"])
            .current_dir(path);
        let output = self.git(runner, &cmd)?;
        Ok(output.stdout.trim_end().to_string())
    }

    /// Runs git, mapping a spawn failure to `SourceUnavailable`.
    fn spawn(
        &self,
        runner: &dyn CommandRunner,
        cmd: &ToolCommand,
    ) -> Result<CommandOutput, BuildError> {
        debug!(command = %cmd, "running git");
        runner.run(cmd).map_err(|e| BuildError::SourceUnavailable {
            uri: self.spec.uri.clone(),
            output: format!("failed to start `{}`: {}. Ensure git is installed and on PATH.", cmd, e),
        })
    }

    /// Runs git for clone/fetch/inspection, where any failure means the
    /// repository cannot be used.
    fn git(
        &self,
        runner: &dyn CommandRunner,
        cmd: &ToolCommand,
    ) -> Result<CommandOutput, BuildError> {
        let output = self.spawn(runner, cmd)?;
        if !output.success {
            return Err(BuildError::SourceUnavailable {
                uri: self.spec.uri.clone(),
                output: format!("`{}` failed.\n\n{}", cmd, output.combined()),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use tempfile::TempDir;

    fn spec() -> RepositorySpec {
        RepositorySpec::new("git://git.libav.org/libav.git", "libav-src", "v9.7")
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current).unwrap().flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let contents = fs::read_to_string(&path).unwrap();
                    files.push((path, contents));
                }
            }
        }
        files.sort();
        files
    }

    #[test]
    fn test_clone_lands_on_tag() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.7", "c0ffee");
        let source = RevisionSource::new(spec(), temp.path());

        let tree = source.checkout(&runner).unwrap();
        assert_eq!(tree.path, temp.path().join("libav-src"));
        assert_eq!(tree.tag, "v9.7");
        assert_eq!(tree.commit, "c0ffee");
        let head = fs::read_to_string(tree.path.join(".git/HEAD")).unwrap();
        assert_eq!(head, "c0ffee");
    }

    #[test]
    fn test_checkout_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.7", "c0ffee");
        let source = RevisionSource::new(spec(), temp.path());

        let first = source.checkout(&runner).unwrap();
        let after_first = snapshot(temp.path());
        let second = source.checkout(&runner).unwrap();
        let after_second = snapshot(temp.path());

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(runner.count_calls("git clone"), 1);
        assert_eq!(runner.count_calls("git checkout"), 1);
    }

    #[test]
    fn test_ensure_is_single_flight() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.7", "c0ffee");
        let source = RevisionSource::new(spec(), temp.path());

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| source.ensure(&runner).unwrap());
            }
        });
        source.ensure(&runner).unwrap();

        assert_eq!(runner.count_calls("git clone"), 1);
        assert_eq!(runner.count_calls("git rev-parse HEAD"), 1);
    }

    #[test]
    fn test_unreachable_remote() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.7", "c0ffee");
        runner.set_unreachable(true);
        let source = RevisionSource::new(spec(), temp.path());

        let err = source.checkout(&runner).unwrap_err();
        assert!(matches!(err, BuildError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("unable to connect"));
    }

    #[test]
    fn test_missing_tag_after_fetch() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.6", "beef");
        let source = RevisionSource::new(spec(), temp.path());

        let err = source.checkout(&runner).unwrap_err();
        assert!(matches!(err, BuildError::TagNotFound { ref tag, .. } if tag == "v9.7"));
        assert_eq!(runner.count_calls("git fetch"), 1);
    }

    #[test]
    fn test_existing_tree_fetches_new_tag() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.6", "beef");
        let old = RevisionSource::new(
            RepositorySpec::new("git://git.libav.org/libav.git", "libav-src", "v9.6"),
            temp.path(),
        );
        old.checkout(&runner).unwrap();

        runner.add_remote_tag("v9.7", "c0ffee");
        let tree = RevisionSource::new(spec(), temp.path())
            .checkout(&runner)
            .unwrap();
        assert_eq!(tree.commit, "c0ffee");
        assert_eq!(runner.count_calls("git fetch"), 1);
        assert_eq!(runner.count_calls("git clone"), 1);
    }

    #[test]
    fn test_dirty_tree_is_refused_then_forced() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.6", "beef");
        runner.add_remote_tag("v9.7", "c0ffee");
        RevisionSource::new(
            RepositorySpec::new("git://git.libav.org/libav.git", "libav-src", "v9.6"),
            temp.path(),
        )
        .checkout(&runner)
        .unwrap();
        fs::write(temp.path().join("libav-src/.git/dirty"), "").unwrap();

        let err = RevisionSource::new(spec(), temp.path())
            .checkout(&runner)
            .unwrap_err();
        assert!(matches!(err, BuildError::DirtyWorkingTree { .. }));
        let head = fs::read_to_string(temp.path().join("libav-src/.git/HEAD")).unwrap();
        assert_eq!(head, "beef");

        let tree = RevisionSource::new(spec(), temp.path())
            .policy(CheckoutPolicy { force: true })
            .checkout(&runner)
            .unwrap();
        assert_eq!(tree.commit, "c0ffee");
    }

    #[test]
    fn test_untracked_conflict_is_dirty_tree() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.6", "beef");
        runner.add_remote_tag("v9.7", "c0ffee");
        RevisionSource::new(
            RepositorySpec::new("git://git.libav.org/libav.git", "libav-src", "v9.6"),
            temp.path(),
        )
        .checkout(&runner)
        .unwrap();
        fs::write(temp.path().join("libav-src/.git/untracked"), "").unwrap();

        let err = RevisionSource::new(spec(), temp.path())
            .checkout(&runner)
            .unwrap_err();
        assert_eq!(err.kind(), "DirtyWorkingTree");
        assert!(err.to_string().contains("libavcodec/new.c"));

        let tree = RevisionSource::new(spec(), temp.path())
            .policy(CheckoutPolicy { force: true })
            .checkout(&runner)
            .unwrap();
        assert_eq!(tree.commit, "c0ffee");
    }

    #[test]
    fn test_missing_git_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let runner = FakeRunner::with_tag("v9.7", "c0ffee");
        runner.remove_tool("git");
        let err = RevisionSource::new(spec(), temp.path())
            .checkout(&runner)
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("git is installed"));
    }
}
