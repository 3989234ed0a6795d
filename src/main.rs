//! Entry point for **ewwd**, the status-bar state daemon.
//!
//! Without a subcommand the daemon runs in the foreground, publishing the
//! `date` and `timer` topics.  Subcommands are thin clients for a running
//! instance.

use clap::Parser;
use deskd::cli::{self, ClientCommand};
use deskd::config::Config;
use deskd::daemon::Daemon;
use deskd::ipc::client::Client;
use deskd::providers::date::DateProvider;
use deskd::providers::timer::TimerProvider;
use log::error;
use std::process::ExitCode;
use std::sync::Arc;

const NAME: &str = "ewwd";
const DEFAULT_SOCKET: &str = "/tmp/ewwd.sock";

/// System utilities daemon for eww status bars
#[derive(Parser)]
#[command(name = NAME, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<ClientCommand>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load_or_default(NAME);
    let client = Client::new(config.socket_path_or(DEFAULT_SOCKET));

    match cli.command {
        Some(cmd) => cli::run(NAME, &client, &cmd),
        None => run_daemon(&config, &client),
    }
}

fn run_daemon(config: &Config, client: &Client) -> ExitCode {
    if client.is_running() {
        eprintln!("{}: daemon already running", NAME);
        return ExitCode::FAILURE;
    }

    let mut daemon = Daemon::new(NAME, client.path())
        .with_mode(0o666)
        .with_provider(Arc::new(DateProvider::new(&config.date)))
        .with_provider(Arc::new(TimerProvider::new(&config.timer)));

    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}: {}", NAME, e);
            ExitCode::FAILURE
        }
    }
}
