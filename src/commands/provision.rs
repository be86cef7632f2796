use clap::Args;

use shipmate::host::Host;
use shipmate::provision::{SystemProvisioner, DEFAULT_DEPLOY_USER};
use shipmate::ssh::{RemoteSession, SshOptions};
use shipmate::Result;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Host to provision (must resolve via DNS)
    pub host: String,

    /// Deployment username to create on the host
    #[arg(long, default_value = DEFAULT_DEPLOY_USER)]
    pub user: String,

    /// SSH identity file (passed to ssh -i)
    #[arg(long, value_name = "FILE")]
    pub identity: Option<String>,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    pub port: u16,
}

pub fn run(args: &ProvisionArgs) -> Result<()> {
    let mut host = Host::new(&args.host);
    host.resolve()?;

    let options = SshOptions {
        port: args.port,
        identity_file: None,
    }
    .with_identity_file(args.identity.as_deref())?;

    let session = RemoteSession::open(&host, options)?;
    SystemProvisioner::new(&session, &args.user).run()
}
