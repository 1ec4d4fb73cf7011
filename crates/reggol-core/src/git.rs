//! Git state capture for reproducibility.
//!
//! The logger never discovers git on its own: callers hand it a
//! [`GitInfoProvider`]. [`GitCli`] shells out to the `git` binary, [`NoGit`]
//! tracks nothing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;

use crate::error::{ReggolError, Result};
use crate::paths;

/// Branch name recorded when HEAD is detached.
pub const DETACHED_BRANCH: &str = "[DETACHED]";

/// Summary file appended with one block per repository.
pub const GIT_INFOS_FILE: &str = "git_infos.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub directory: PathBuf,
    pub code_diff: String,
    pub code_diff_staged: String,
    pub commit_hash: String,
    pub branch_name: String,
}

pub trait GitInfoProvider {
    /// One entry per tracked directory. An `Err` entry means that directory
    /// has no usable git info; the others are still logged.
    fn repo_infos(&self) -> Vec<Result<RepoInfo>>;
}

/// Tracks no repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGit;

impl GitInfoProvider for NoGit {
    fn repo_infos(&self) -> Vec<Result<RepoInfo>> {
        Vec::new()
    }
}

/// Reads repository state by running `git` in each directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    dirs: Vec<PathBuf>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            dirs: vec![paths::project_root()],
        }
    }
}

impl GitCli {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn repo_info(&self, dir: &Path) -> Result<RepoInfo> {
        let commit_hash = run_git(dir, &["rev-parse", "HEAD"])?.trim().to_string();
        let branch_name = match run_git(dir, &["symbolic-ref", "--short", "-q", "HEAD"]) {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => DETACHED_BRANCH.to_string(),
        };
        Ok(RepoInfo {
            directory: dir.to_path_buf(),
            code_diff: run_git(dir, &["diff"])?,
            code_diff_staged: run_git(dir, &["diff", "--staged"])?,
            commit_hash,
            branch_name,
        })
    }
}

impl GitInfoProvider for GitCli {
    fn repo_infos(&self) -> Vec<Result<RepoInfo>> {
        self.dirs.iter().map(|dir| self.repo_info(dir)).collect()
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let unavailable = |reason: String| ReggolError::GitUnavailable {
        directory: dir.to_path_buf(),
        reason,
    };
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| unavailable(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        return Err(unavailable(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Base name for a repository's patch files: the path without leading or
/// trailing `/`, with the remaining separators turned into `-`.
pub fn patch_file_stem(directory: &Path) -> String {
    directory
        .to_string_lossy()
        .trim_matches('/')
        .replace('/', "-")
}

/// Write patch files and `git_infos.txt` for every repository the provider
/// reports. Failing directories are skipped with a warning. Returns the
/// number of repositories logged.
pub fn log_git(log_dir: &Path, provider: &dyn GitInfoProvider) -> Result<usize> {
    let mut logged = 0;
    for info in provider.repo_infos() {
        match info {
            Ok(info) => {
                write_repo_info(log_dir, &info)?;
                logged += 1;
            }
            Err(e) => warn!(error = %e, "skipping git info"),
        }
    }
    Ok(logged)
}

fn write_repo_info(log_dir: &Path, info: &RepoInfo) -> Result<()> {
    let stem = patch_file_stem(&info.directory);
    for (diff, name) in [
        (&info.code_diff, format!("{stem}.patch")),
        (&info.code_diff_staged, format!("{stem}_staged.patch")),
    ] {
        if diff.is_empty() {
            continue;
        }
        let path = log_dir.join(name);
        fs::write(&path, format!("{diff}\n")).map_err(|e| ReggolError::file_access(&path, e))?;
    }

    let infos_path = log_dir.join(GIT_INFOS_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&infos_path)
        .map_err(|e| ReggolError::file_access(&infos_path, e))?;
    write!(
        file,
        "directory: {}\ngit hash: {}\ngit branch name: {}\n\n",
        info.directory.to_string_lossy().trim_end_matches('/'),
        info.commit_hash,
        info.branch_name
    )
    .map_err(|e| ReggolError::file_access(&infos_path, e))
}
