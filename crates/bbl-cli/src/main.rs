mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

use bbl_domain::State;
use bbl_pipeline::PipelineError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    let dir = cli.state_dir.as_path();
    match cli.command {
        Command::Plan(flags) => commands::plan(dir, flags).await,
        Command::Up(flags) => commands::up(dir, flags).await,
        Command::CreateLbs {
            lb_type,
            cert,
            key,
            chain,
            domain,
        } => commands::create_lbs(dir, lb_type, cert, key, chain, domain).await,
        Command::UpdateLbs { cert, key, chain } => {
            commands::update_lbs(dir, cert, key, chain).await
        }
        Command::DeleteLbs => commands::delete_lbs(dir).await,
        Command::Rotate => commands::rotate(dir).await,
        Command::Destroy { skip_if_missing } => commands::destroy(dir, skip_if_missing).await,
        Command::PrintEnv => commands::print_env(dir).await,
        Command::Ssh => commands::ssh(dir).await,
        Command::Lbs => commands::lbs(dir).await,
        Command::EnvId => commands::env_id(dir).await,
        Command::JumpboxAddress => commands::jumpbox_address(dir).await,
        Command::SshKey => commands::ssh_key(dir).await,
        Command::DirectorSshKey => commands::director_ssh_key(dir).await,
        Command::DirectorAddress => {
            commands::director_field(
                dir,
                |s: &State| s.bosh.director_address.as_str(),
                "director address",
            )
            .await
        }
        Command::DirectorUsername => {
            commands::director_field(
                dir,
                |s: &State| s.bosh.director_username.as_str(),
                "director username",
            )
            .await
        }
        Command::DirectorPassword => {
            commands::director_field(
                dir,
                |s: &State| s.bosh.director_password.as_str(),
                "director password",
            )
            .await
        }
        Command::DirectorCaCert => {
            commands::director_field(
                dir,
                |s: &State| s.bosh.director_ssl_ca.as_str(),
                "director ca cert",
            )
            .await
        }
        Command::CloudConfig => commands::cloud_config(dir).await,
        Command::Outputs => commands::outputs(dir).await,
    }
}
