//! Local project settings and deployment preconditions.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::envfile::Env;
use crate::error::{Error, Result};
use crate::git;

/// Per-project config, committed alongside the app (unlike the database
/// config, this file holds nothing secret by convention; secrets belong in
/// `env` overrides passed on the command line or the remote `.env`).
pub const CONFIG_FILE: &str = "config/shipmate.yml";

/// The app config that must exist locally but never be committed. It is
/// environment-specific; the deployed copy is generated on the host.
pub const UNTRACKED_CONFIG_FILE: &str = "config/database.yml";

const REQUIRED_TRACKED_FILES: &[&str] = &["Procfile", "Gemfile", ".ruby-version"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSettings {
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub env: Env,
}

impl ProjectSettings {
    /// Load `config/shipmate.yml` from the project root. A missing file is
    /// fine (all settings have CLI equivalents); a malformed one is not.
    pub fn load(repo: &Path) -> Result<Self> {
        let path = repo.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(ProjectSettings::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_yml::from_str(&content)?)
    }
}

/// Validate the local working copy before any remote mutation.
///
/// Required: the path is a git repository; the entry-point descriptor,
/// dependency manifest, and pinned runtime version are committed; the
/// environment-specific database config exists but is git-ignored, never
/// tracked.
pub fn check_local_app(repo: &Path) -> Result<()> {
    if !git::is_git_repo(repo) {
        return Err(Error::precondition(format!(
            "{} is not a git repository",
            repo.display()
        )));
    }

    for file in REQUIRED_TRACKED_FILES {
        if !repo.join(file).is_file() {
            return Err(Error::precondition(format!(
                "repository must have a {} file",
                file
            )));
        }
        if !git::is_tracked(repo, file) {
            return Err(Error::precondition(format!(
                "{} must be committed to git",
                file
            )));
        }
    }

    if !repo.join(UNTRACKED_CONFIG_FILE).is_file() {
        return Err(Error::precondition(format!(
            "repository must have a {} file",
            UNTRACKED_CONFIG_FILE
        )));
    }
    if git::is_tracked(repo, UNTRACKED_CONFIG_FILE) {
        return Err(Error::precondition(format!(
            "{} is checked into git and should not be",
            UNTRACKED_CONFIG_FILE
        )));
    }
    if !git::is_ignored(repo, UNTRACKED_CONFIG_FILE) {
        return Err(Error::precondition(format!(
            "{} is not ignored by git and should be",
            UNTRACKED_CONFIG_FILE
        )));
    }

    Ok(())
}

/// The pinned runtime version, trimmed of the trailing newline editors add.
pub fn ruby_version(repo: &Path) -> Result<String> {
    let version = fs::read_to_string(repo.join(".ruby-version"))?;
    let version = version.trim();
    if version.is_empty() {
        return Err(Error::precondition(".ruby-version is empty"));
    }
    Ok(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn run(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(repo)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn valid_app() -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = dir.path();
        run(repo, &["init", "-q"]);
        run(repo, &["config", "user.email", "test@example.com"]);
        run(repo, &["config", "user.name", "Test"]);
        fs::write(repo.join("Procfile"), "web: bundle exec puma\n").unwrap();
        fs::write(repo.join("Gemfile"), "source 'https://rubygems.org'\n").unwrap();
        fs::write(repo.join(".ruby-version"), "3.2.2\n").unwrap();
        fs::write(repo.join(".gitignore"), "config/database.yml\n").unwrap();
        fs::create_dir_all(repo.join("config")).unwrap();
        fs::write(repo.join(UNTRACKED_CONFIG_FILE), "production:\n  adapter: postgresql\n")
            .unwrap();
        run(repo, &["add", "Procfile", "Gemfile", ".ruby-version", ".gitignore"]);
        run(repo, &["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn valid_app_passes_preconditions() {
        let dir = valid_app();
        check_local_app(dir.path()).unwrap();
    }

    #[test]
    fn non_repo_fails() {
        let dir = TempDir::new().unwrap();
        let err = check_local_app(dir.path()).unwrap_err();
        assert_eq!(err.code(), "precondition");
    }

    #[test]
    fn missing_procfile_fails() {
        let dir = valid_app();
        fs::remove_file(dir.path().join("Procfile")).unwrap();
        assert!(check_local_app(dir.path()).is_err());
    }

    #[test]
    fn tracked_database_config_fails() {
        let dir = valid_app();
        let repo = dir.path();
        fs::write(repo.join(".gitignore"), "").unwrap();
        run(repo, &["add", "-f", UNTRACKED_CONFIG_FILE, ".gitignore"]);
        run(repo, &["commit", "-q", "-m", "oops"]);
        let err = check_local_app(repo).unwrap_err();
        assert!(err.to_string().contains("checked into git"));
    }

    #[test]
    fn unignored_database_config_fails() {
        let dir = valid_app();
        let repo = dir.path();
        fs::write(repo.join(".gitignore"), "").unwrap();
        run(repo, &["add", ".gitignore"]);
        run(repo, &["commit", "-q", "-m", "drop ignore"]);
        let err = check_local_app(repo).unwrap_err();
        assert!(err.to_string().contains("not ignored"));
    }

    #[test]
    fn ruby_version_is_trimmed() {
        let dir = valid_app();
        assert_eq!(ruby_version(dir.path()).unwrap(), "3.2.2");
    }

    #[test]
    fn settings_default_when_config_absent() {
        let dir = valid_app();
        let settings = ProjectSettings::load(dir.path()).unwrap();
        assert!(settings.app.is_none());
        assert!(settings.env.is_empty());
    }

    #[test]
    fn settings_parse_from_yaml() {
        let dir = valid_app();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "app: blog\nremote: production\nenv:\n  WEB_CONCURRENCY: \"2\"\n",
        )
        .unwrap();
        let settings = ProjectSettings::load(dir.path()).unwrap();
        assert_eq!(settings.app.as_deref(), Some("blog"));
        assert_eq!(settings.remote.as_deref(), Some("production"));
        assert_eq!(settings.env["WEB_CONCURRENCY"], "2");
    }
}
