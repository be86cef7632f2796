//! Local git queries and operations used by the deployment procedures.
//!
//! The working directory is always an explicit argument; nothing here (or
//! anywhere else) mutates the process working directory.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

fn git(repo: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| Error::git(format!("failed to run git {}: {}", args.join(" "), e)))
}

fn git_ok(repo: &Path, args: &[&str]) -> bool {
    git(repo, args)
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn is_git_repo(repo: &Path) -> bool {
    repo.join(".git").is_dir()
}

/// Whether `file` is tracked (committed or staged).
pub fn is_tracked(repo: &Path, file: &str) -> bool {
    git_ok(repo, &["ls-files", file, "--error-unmatch"])
}

/// Whether `file` is matched by the repository's ignore rules.
pub fn is_ignored(repo: &Path, file: &str) -> bool {
    git_ok(repo, &["check-ignore", file])
}

/// Commit id of local HEAD.
pub fn head_commit(repo: &Path) -> Result<String> {
    let output = git(repo, &["rev-parse", "HEAD"])?;
    if !output.status.success() {
        return Err(Error::git(format!(
            "could not read HEAD in {}: {}",
            repo.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn has_remote(repo: &Path, name: &str) -> bool {
    git_ok(repo, &["remote", "get-url", name])
}

/// Add a named remote pointing at the deployment destination.
pub fn add_remote(repo: &Path, name: &str, url: &str) -> Result<()> {
    let output = git(repo, &["remote", "add", name, url])?;
    if !output.status.success() {
        return Err(Error::git(format!(
            "git remote add {} failed: {}",
            name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Record the ssh invocation git should use for this repository, so pushes
/// authenticate with the same identity file the deployment sessions use.
pub fn set_ssh_command(repo: &Path, command: &str) -> Result<()> {
    let output = git(repo, &["config", "core.sshCommand", command])?;
    if !output.status.success() {
        return Err(Error::git(format!(
            "git config core.sshCommand failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Push all branches to the named remote, inheriting the terminal so push
/// progress is visible.
pub fn push_all(repo: &Path, remote: &str) -> Result<()> {
    let status = Command::new("git")
        .args(["push", "--all", remote])
        .current_dir(repo)
        .status()
        .map_err(|e| Error::git(format!("failed to run git push: {}", e)))?;

    if !status.success() {
        return Err(Error::git(format!(
            "git push --all {} exited with {}",
            remote,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}
