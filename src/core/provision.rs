//! System provisioning: take a bare host to "ready for deployment".
//!
//! A fixed, linear sequence of root/deployment-user steps. Fail-fast: the
//! first failing step aborts with its diagnostic and nothing is rolled back.

use crate::error::Result;
use crate::ssh::RemoteSession;
use crate::template::{TemplateStore, VariableContext};

pub const DEFAULT_DEPLOY_USER: &str = "app";

const SYSTEM_PACKAGES: &[&str] = &[
    "make",
    "automake",
    "autoconf",
    "gcc",
    "libssl-dev",
    "libreadline-dev",
    "nginx",
    "postgresql",
    "postgresql-client",
    "postgresql-server-dev-all",
    "redis-server",
    "redis-tools",
    "git",
    "makepasswd",
    "nodejs",
    "ruby",
];

const INSTALL_PACKAGES: &str = r#"
# Ensure package files are up to date
DEBIAN_FRONTEND="noninteractive" dpkg --configure -a
DEBIAN_FRONTEND="noninteractive" apt-get -y update -qq
DEBIAN_FRONTEND="noninteractive" apt-get -y upgrade

# Install packages that we use
DEBIAN_FRONTEND="noninteractive" apt-get -y install %%packages%%

# Install foreman in the system ruby
/usr/bin/gem install --no-document foreman

# Configure postgres for password authentication
echo %%inject:pg_hba%% | tee /etc/postgresql/*/main/pg_hba.conf > /dev/null
service postgresql restart

# Write the sudoers entry for the deployment user
echo %%inject:sudoers%% > /etc/sudoers.d/shipmate
chmod 0440 /etc/sudoers.d/shipmate
"#;

const CREATE_DEPLOY_USER: &str = r#"
# Create the deployment user once; an existing home directory means a
# previous run already did this
if [ ! -d %%app_home%% ]; then
    useradd \
        --home %%app_home%% \
        --create-home \
        --shell /bin/bash \
        --password "$( makepasswd --chars=20 )" \
        %%app_username%%

    # Grant access to the same keys root uses
    mkdir -p %%app_home%%/.ssh
    cp /root/.ssh/authorized_keys %%app_home%%/.ssh/authorized_keys
    chown -R %%app_username%% %%app_home%%/.ssh
    chmod -R go-rwx %%app_home%%/.ssh
fi
"#;

const INSTALL_RUNTIME_MANAGER: &str = r#"
# Set up rvm for the deployment user
curl -sSL https://get.rvm.io | bash -s stable --with-gems="bundler puma"

# Install the port allocation helper
mkdir -p $HOME/.port_numbers
echo %%inject:get_port%% > $HOME/.port_numbers/get_port
chmod u+x $HOME/.port_numbers/get_port
"#;

const INSTALL_RVM_REQUIREMENTS: &str = r#"
# rvm needs root to install ruby build dependencies
%%app_home%%/.rvm/bin/rvm requirements
"#;

pub struct SystemProvisioner<'a> {
    session: &'a RemoteSession<'a>,
    deploy_user: String,
}

impl<'a> SystemProvisioner<'a> {
    pub fn new(session: &'a RemoteSession<'a>, deploy_user: impl Into<String>) -> Self {
        SystemProvisioner {
            session,
            deploy_user: deploy_user.into(),
        }
    }

    fn context(&self) -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.set("app_username", &self.deploy_user);
        ctx.set("app_home", format!("/home/{}", self.deploy_user));
        ctx.set("packages", SYSTEM_PACKAGES.join(" "));
        ctx.set_template("pg_hba", "pg_hba.conf");
        ctx.set_template("sudoers", "sudoers");
        ctx.set_template("get_port", "get-port.sh");
        ctx
    }

    pub fn run(&self) -> Result<()> {
        let store = TemplateStore::global();
        let ctx = self.context();

        log_status!(
            "provision",
            "Installing system packages: {}",
            SYSTEM_PACKAGES.join(" ")
        );
        self.session.execute_checked(
            "install system packages",
            "root",
            &store.resolve(INSTALL_PACKAGES, &ctx)?,
        )?;

        log_status!("provision", "Creating deployment user '{}'", self.deploy_user);
        self.session.execute_checked(
            "create deployment user",
            "root",
            &store.resolve(CREATE_DEPLOY_USER, &ctx)?,
        )?;

        log_status!("provision", "Installing rvm for '{}'", self.deploy_user);
        self.session.execute_checked(
            "install runtime manager",
            &self.deploy_user,
            &store.resolve(INSTALL_RUNTIME_MANAGER, &ctx)?,
        )?;

        log_status!("provision", "Installing rvm build requirements");
        self.session.execute_checked(
            "install rvm requirements",
            "root",
            &store.resolve(INSTALL_RVM_REQUIREMENTS, &ctx)?,
        )?;

        log_status!("provision", "System ready for deployment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_scripts_fully_resolve() {
        let store = TemplateStore::global();
        let mut ctx = VariableContext::new();
        ctx.set("app_username", "app");
        ctx.set("app_home", "/home/app");
        ctx.set("packages", SYSTEM_PACKAGES.join(" "));
        ctx.set_template("pg_hba", "pg_hba.conf");
        ctx.set_template("sudoers", "sudoers");
        ctx.set_template("get_port", "get-port.sh");

        for body in [
            INSTALL_PACKAGES,
            CREATE_DEPLOY_USER,
            INSTALL_RUNTIME_MANAGER,
            INSTALL_RVM_REQUIREMENTS,
        ] {
            let resolved = store.resolve(body, &ctx).unwrap();
            assert!(!resolved.contains("%%"), "residual token in {:?}", resolved);
        }
    }

    #[test]
    fn injected_sudoers_is_quoted_payload() {
        let store = TemplateStore::global();
        let mut ctx = VariableContext::new();
        ctx.set("app_username", "app");
        ctx.set("app_home", "/home/app");
        ctx.set("packages", "git");
        ctx.set_template("pg_hba", "pg_hba.conf");
        ctx.set_template("sudoers", "sudoers");

        let resolved = store.resolve(INSTALL_PACKAGES, &ctx).unwrap();
        // The sudoers payload is one quoted word containing the resolved user
        assert!(resolved.contains("echo '# Managed by shipmate"));
        assert!(resolved.contains("app ALL=(root) NOPASSWD"));
    }

    #[test]
    fn user_creation_is_guarded_by_home_directory() {
        let store = TemplateStore::global();
        let mut ctx = VariableContext::new();
        ctx.set("app_username", "deploy");
        ctx.set("app_home", "/home/deploy");
        let resolved = store.resolve(CREATE_DEPLOY_USER, &ctx).unwrap();
        assert!(resolved.contains("if [ ! -d /home/deploy ]"));
        assert!(resolved.contains("useradd"));
    }
}
