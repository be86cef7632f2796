use std::path::PathBuf;

use clap::Args;

use shipmate::deploy::{AppInitializer, DeployOptions};
use shipmate::error::Error;
use shipmate::host::Host;
use shipmate::project::ProjectSettings;
use shipmate::provision::DEFAULT_DEPLOY_USER;
use shipmate::ssh::{RemoteSession, SshOptions};
use shipmate::Result;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Target host to deploy to (must resolve via DNS)
    pub host: String,

    /// App name, used for the remote directory, database, and nginx entry
    /// (defaults to `app` from config/shipmate.yml)
    #[arg(long)]
    pub app: Option<String>,

    /// Name for the local git remote pointing at the host
    #[arg(long)]
    pub remote: Option<String>,

    /// Public hostname nginx should answer for (defaults to the target host)
    #[arg(long = "app-host", value_name = "HOSTNAME")]
    pub app_host: Option<String>,

    /// Local working copy of the project
    #[arg(long, default_value = ".")]
    pub path: String,

    /// Extra environment for the deployed app (repeatable, highest precedence)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Deployment username on the host
    #[arg(long, default_value = DEFAULT_DEPLOY_USER)]
    pub user: String,

    /// SSH identity file (passed to ssh -i)
    #[arg(long, value_name = "FILE")]
    pub identity: Option<String>,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    pub port: u16,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let local_path = PathBuf::from(shellexpand::tilde(&args.path).to_string());
    let settings = ProjectSettings::load(&local_path)?;

    let app_name = args
        .app
        .clone()
        .or(settings.app)
        .ok_or_else(|| Error::config("app name not set (use --app or config/shipmate.yml)"))?;
    let remote_name = args
        .remote
        .clone()
        .or(settings.remote)
        .unwrap_or_else(|| "production".to_string());
    let app_hostname = args.app_host.clone().unwrap_or_else(|| args.host.clone());

    // Config file env is caller-supplied too; explicit --env flags win
    let mut env_overrides = settings.env;
    for pair in &args.env {
        let (key, value) = parse_env_pair(pair)?;
        env_overrides.insert(key, value);
    }

    let mut host = Host::new(&args.host);
    host.resolve()?;

    let options = SshOptions {
        port: args.port,
        identity_file: None,
    }
    .with_identity_file(args.identity.as_deref())?;
    let session = RemoteSession::open(&host, options)?;

    AppInitializer::new(
        &session,
        &host,
        DeployOptions {
            local_path,
            app_name,
            remote_name,
            app_hostname,
            deploy_user: args.user.clone(),
            env_overrides,
        },
    )
    .run()
}

fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::config(format!(
            "--env expects KEY=VALUE, got '{}'",
            pair
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pair_parses_key_and_value() {
        assert_eq!(
            parse_env_pair("FOO=bar").unwrap(),
            ("FOO".to_string(), "bar".to_string())
        );
        // Values may contain '='
        assert_eq!(
            parse_env_pair("URL=postgres://u:p@h/db?a=b").unwrap().1,
            "postgres://u:p@h/db?a=b"
        );
    }

    #[test]
    fn env_pair_rejects_missing_separator() {
        assert!(parse_env_pair("FOO").is_err());
        assert!(parse_env_pair("=bar").is_err());
    }
}
