use clap::{Parser, Subcommand};

mod commands;

use commands::{init, provision};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "shipmate")]
#[command(version = VERSION)]
#[command(about = "Provision hosts and deploy apps over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a bare host for deployment
    Provision(provision::ProvisionArgs),
    /// Initialize and deploy a project to a provisioned host
    Init(init::InitArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Provision(args) => provision::run(args),
        Commands::Init(args) => init::run(args),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {}", err.code(), err);
            std::process::ExitCode::FAILURE
        }
    }
}
