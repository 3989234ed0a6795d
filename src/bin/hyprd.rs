//! Entry point for **hyprd**, the Hyprland workspace daemon.
//!
//! Without a subcommand the daemon runs in the foreground, following
//! Hyprland's event socket and publishing the `workspace` topic.

use clap::{Parser, Subcommand};
use deskd::cli::{self, ClientCommand};
use deskd::command::Request;
use deskd::config::Config;
use deskd::daemon::{Daemon, ExtensionHandler};
use deskd::hyprland::{Commands, HyprlandClient, WorkspaceTracker};
use deskd::ipc::client::Client;
use log::error;
use std::process::ExitCode;
use std::sync::Arc;

const NAME: &str = "hyprd";
const DEFAULT_SOCKET: &str = "/tmp/hyprd.sock";

/// Hyprland workspace daemon for eww widgets
#[derive(Parser)]
#[command(name = NAME, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<HyprCommand>,
}

#[derive(Subcommand)]
enum HyprCommand {
    #[command(flatten)]
    Client(ClientCommand),

    /// Switch to a workspace
    Ws { workspace: String },

    /// Focus a window by class, optionally by exact title
    Focus {
        class: String,
        #[arg(trailing_var_arg = true)]
        title: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load_or_default(NAME);
    let client = Client::new(config.socket_path_or(DEFAULT_SOCKET));

    match cli.command {
        Some(HyprCommand::Client(cmd)) => cli::run(NAME, &client, &cmd),
        Some(HyprCommand::Ws { workspace }) => cli::send_and_print(
            NAME,
            &client,
            &Request::Other {
                verb: "ws".into(),
                arg: workspace,
            },
        ),
        Some(HyprCommand::Focus { class, title }) => cli::send_and_print(
            NAME,
            &client,
            &Request::Other {
                verb: "focus".into(),
                arg: format!("{} {}", class, title.join(" ")).trim().to_string(),
            },
        ),
        None => run_daemon(&client),
    }
}

fn run_daemon(client: &Client) -> ExitCode {
    if client.is_running() {
        eprintln!("{}: daemon already running", NAME);
        return ExitCode::FAILURE;
    }

    let hypr = match HyprlandClient::from_env() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("{}: {}", NAME, e);
            return ExitCode::FAILURE;
        }
    };

    let commands = Arc::new(Commands::new(hypr.clone()));
    let extension: ExtensionHandler = Arc::new(move |verb: &str, arg: &str| commands.handle(verb, arg));

    let mut daemon = Daemon::new(NAME, client.path())
        .with_mode(0o600)
        .with_topics(&["workspace"])
        .with_extension(extension)
        .with_provider(Arc::new(WorkspaceTracker::new(hypr)));

    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}: {}", NAME, e);
            ExitCode::FAILURE
        }
    }
}
