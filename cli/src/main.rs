/*!

This is the command line interface for waiting on the resources and guests that Kong integration
tests create.

!*/

mod retry_delay;
mod settings;
mod wait_ssh;
mod wait_status;

use anyhow::{Context, Result};
use clap::Parser;
use kong_utils::{init_logger, Settings};
use log::LevelFilter;

/// Wait for cloud resources to settle and for guests to become reachable.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Wait for a resource to reach a status and print its final representation.
    WaitStatus(wait_status::WaitStatus),
    /// Wait for a resource to be deleted.
    WaitDeleted(wait_status::WaitDeleted),
    /// Wait until a guest accepts an SSH login, optionally running a command once it does.
    WaitSsh(wait_ssh::WaitSsh),
    /// Wait until a guest drops its SSH connection, e.g. while rebooting.
    WaitSshClosed(wait_ssh::WaitSshClosed),
    /// Print how many seconds a rate-limited request should wait before retrying.
    RetryDelay(retry_delay::RetryDelay),
    /// Print the settings in effect.
    Settings(settings::ShowSettings),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(env!("CARGO_CRATE_NAME"), Some(args.log_level));
    if let Err(e) = run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::from_env().context("Unable to read settings")?;
    match args.command {
        Command::WaitStatus(wait_status) => wait_status.run(settings).await,
        Command::WaitDeleted(wait_deleted) => wait_deleted.run(settings).await,
        Command::WaitSsh(wait_ssh) => wait_ssh.run(settings).await,
        Command::WaitSshClosed(wait_ssh_closed) => wait_ssh_closed.run(settings).await,
        Command::RetryDelay(retry_delay) => retry_delay.run(),
        Command::Settings(show_settings) => show_settings.run(settings),
    }
}
