//! Project initialization: deploy an app to a provisioned host.
//!
//! Linear sequence with two decision points: idempotent create (skip
//! creation-only steps when the app already exists on the host) and
//! push-or-notify (skip the push when local and remote HEAD already match,
//! re-running the receive hook instead). Everything else is fail-fast with
//! no rollback; a mid-procedure failure can leave the host partially
//! initialized and the rerun path exists precisely for that case.

use std::path::{Path, PathBuf};

use crate::envfile::{self, Env};
use crate::error::Result;
use crate::git;
use crate::host::Host;
use crate::project;
use crate::ssh::RemoteSession;
use crate::template::VariableContext;
use crate::utils::secret;
use crate::utils::validation;

pub struct DeployOptions {
    /// Local working copy root. Threaded explicitly; the process working
    /// directory is never changed.
    pub local_path: PathBuf,
    pub app_name: String,
    pub remote_name: String,
    /// Public hostname the reverse proxy will answer for.
    pub app_hostname: String,
    pub deploy_user: String,
    /// Caller-supplied environment, highest merge precedence.
    pub env_overrides: Env,
}

/// Which creation-only steps a run still has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPlan {
    pub create_database: bool,
    pub initialize_app: bool,
}

impl InitPlan {
    /// Creation-only steps are skipped when a prior deployment is detected.
    /// Environment and proxy configuration are always re-applied, and the
    /// runtime install is idempotent on its own.
    pub fn for_target(already_deployed: bool) -> Self {
        InitPlan {
            create_database: !already_deployed,
            initialize_app: !already_deployed,
        }
    }
}

/// Whether to push, or to re-run the remote receive hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    Push,
    NotifyHook,
}

/// A remote HEAD equal to the local one means the code is already there;
/// pushing again would be a no-op that skips the hook, so notify instead.
pub fn push_decision(local_head: &str, remote_head: Option<&str>) -> PushDecision {
    match remote_head {
        Some(remote) if remote == local_head => PushDecision::NotifyHook,
        _ => PushDecision::Push,
    }
}

/// URL for the git remote pointing at the deployment destination. The
/// scp-like form only ever connects on port 22, so a non-default port gets
/// the explicit ssh:// form; `/~/` keeps the path home-relative either way.
pub fn remote_url(user: &str, host: &str, app: &str, port: u16) -> String {
    if port == 22 {
        format!("{}@{}:{}", user, host, app)
    } else {
        format!("ssh://{}@{}:{}/~/{}", user, host, port, app)
    }
}

pub struct AppInitializer<'a> {
    session: &'a RemoteSession<'a>,
    host: &'a Host,
    options: DeployOptions,
}

impl<'a> AppInitializer<'a> {
    pub fn new(session: &'a RemoteSession<'a>, host: &'a Host, options: DeployOptions) -> Self {
        AppInitializer {
            session,
            host,
            options,
        }
    }

    fn app_home(&self) -> String {
        format!("/home/{}", self.options.deploy_user)
    }

    fn app_root(&self) -> String {
        format!("{}/{}", self.app_home(), self.options.app_name)
    }

    /// Fixed identifiers every template may reference, extended per step.
    fn base_context(&self) -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.set("app", &self.options.app_name);
        ctx.set("app_username", &self.options.deploy_user);
        ctx.set("app_home", self.app_home());
        ctx.set("app_root", self.app_root());
        ctx.set("app_hostname", &self.options.app_hostname);
        ctx.set("hostname", self.host.hostname());
        ctx
    }

    pub fn run(&self) -> Result<()> {
        let repo = self.options.local_path.as_path();
        let user = self.options.deploy_user.as_str();

        log_status!("init", "Verifying configuration details");
        project::check_local_app(repo)?;
        validation::require_symbol(&self.options.app_name, "app name")?;
        validation::require_symbol(&self.options.remote_name, "remote name")?;
        validation::require_hostname_shape(&self.options.app_hostname, "app hostname")?;

        log_status!("init", "Checking if app '{}' already exists", self.options.app_name);
        let already_deployed = self.session.path_exists(user, &self.options.app_name)?;
        if already_deployed {
            log_status!(
                "init",
                "App already exists on {}; re-applying configuration only",
                self.host.hostname()
            );
        }
        let plan = InitPlan::for_target(already_deployed);

        log_status!("init", "Installing the ruby used by this project");
        let mut ctx = self.base_context();
        ctx.set("version", project::ruby_version(repo)?);
        self.session
            .run_template("install ruby", user, "install-ruby.sh", &ctx)?;

        log_status!("init", "Adding the local git remote '{}'", self.options.remote_name);
        self.add_git_remote(repo)?;

        if plan.create_database {
            log_status!("init", "Creating a postgres database");
            self.create_database()?;
        }

        if plan.initialize_app {
            log_status!("init", "Initializing the app on the remote host");
            let mut ctx = self.base_context();
            ctx.set_template("post_receive", "post-receive.sh");
            self.session
                .run_template("initialize app", user, "initialize-new-app.sh", &ctx)?;
        }

        log_status!("init", "Writing the app environment file");
        self.write_env_file()?;

        log_status!("init", "Configuring nginx for '{}'", self.options.app_hostname);
        let mut ctx = self.base_context();
        ctx.set_template("nginx_site", "nginx-site.conf");
        self.session
            .run_template("configure nginx", "root", "nginx-configure-app.sh", &ctx)?;

        self.push_or_notify(repo)?;

        log_status!("init", "Deployment of '{}' complete", self.options.app_name);
        Ok(())
    }

    fn add_git_remote(&self, repo: &Path) -> Result<()> {
        let ssh_options = self.session.options();

        if !git::has_remote(repo, &self.options.remote_name) {
            let url = remote_url(
                &self.options.deploy_user,
                self.host.hostname(),
                &self.options.app_name,
                ssh_options.port,
            );
            git::add_remote(repo, &self.options.remote_name, &url)?;
        } else {
            log_status!("init", "Remote '{}' already configured", self.options.remote_name);
        }

        // Pushes must authenticate the same way the sessions do
        if let Some(identity) = &ssh_options.identity_file {
            let ssh_command = format!("ssh -i {}", crate::utils::shell::quote_path(identity));
            git::set_ssh_command(repo, &ssh_command)?;
        }

        Ok(())
    }

    /// Not idempotent by design: the password is fresh per install, which is
    /// why this step is creation-only.
    fn create_database(&self) -> Result<()> {
        let password = secret::random_hex(16);
        let mut ctx = self.base_context();
        ctx.set("dbname", &self.options.app_name);
        ctx.set("dbuser", &self.options.app_name);
        ctx.set("dbpass", &password);
        ctx.set(
            "pgpass_line",
            format!(
                "localhost:5432:{}:{}:{}",
                self.options.app_name, self.options.app_name, password
            ),
        );
        self.session
            .run_template("create database", "root", "create-postgres-database.sh", &ctx)?;
        Ok(())
    }

    fn write_env_file(&self) -> Result<()> {
        let user = self.options.deploy_user.as_str();
        let env_path = format!("{}/.env", self.options.app_name);

        let mut baseline = Env::new();
        baseline.insert("RAILS_ENV".to_string(), "production".to_string());
        baseline.insert(
            "PATH".to_string(),
            format!("{}/.rvm/wrappers/{}:$PATH", self.app_home(), self.options.app_name),
        );
        baseline.insert("SECRET_KEY_BASE".to_string(), secret::random_hex(64));

        // Second runs keep the secrets the first run generated
        let existing = self
            .session
            .read_file(user, &env_path)?
            .map(|content| envfile::parse(&content))
            .unwrap_or_default();

        let merged = envfile::merge(&baseline, &existing, &self.options.env_overrides);
        self.session
            .write_file("write env file", user, &env_path, &envfile::serialize(&merged))?;
        Ok(())
    }

    fn push_or_notify(&self, repo: &Path) -> Result<()> {
        let user = self.options.deploy_user.as_str();
        let local_head = git::head_commit(repo)?;

        let probe = format!(
            "cd {} && git rev-parse HEAD",
            crate::utils::shell::quote_path(&self.options.app_name)
        );
        let remote_head = self.session.execute_with(user, &probe, |result| {
            if result.success() {
                Some(result.stdout.trim().to_string())
            } else {
                None
            }
        })?;

        match push_decision(&local_head, remote_head.as_deref()) {
            PushDecision::NotifyHook => {
                log_status!("init", "Already up to date; running the receive hook");
                let hook = format!("{}/.git/hooks/post-receive", self.app_root());
                self.session.execute_checked("run receive hook", user, &hook)?;
            }
            PushDecision::Push => {
                log_status!("init", "Pushing the local repository to '{}'", self.options.remote_name);
                git::push_all(repo, &self.options.remote_name)?;
            }
        }
        Ok(())
    }
}
