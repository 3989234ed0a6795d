//! Client-side subcommands shared by both daemon binaries.
//!
//! Running a binary without a subcommand starts the daemon; every
//! subcommand here instead talks to an already running instance.

use crate::command::Request;
use crate::ipc::client::{Client, ClientError};
use clap::Subcommand;
use std::io::Write;
use std::process::ExitCode;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Check whether the daemon is running
    Status {
        /// Print the full state map as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the value of one topic, or the whole state map
    Query {
        /// Topic name (default: all)
        topic: Option<String>,
    },

    /// Stream events as JSON lines
    Subscribe {
        /// Topics to follow (default: every topic)
        topics: Vec<String>,
    },

    /// Run a provider action
    Action {
        provider: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl ClientCommand {
    /// The wire request this subcommand sends.
    pub fn request(&self) -> Request {
        match self {
            ClientCommand::Status { json: true } => Request::State,
            ClientCommand::Status { json: false } => Request::Status,
            ClientCommand::Query { topic } => Request::Query(topic.clone()),
            ClientCommand::Subscribe { topics } => {
                Request::parse(&format!("subscribe {}", topics.join(" ")))
            }
            ClientCommand::Action { provider, args } => Request::Action {
                provider: Some(provider.clone()),
                args: args.clone(),
            },
        }
    }
}

/// Run `cmd` against the daemon `name` listening at `client`.
pub fn run(name: &str, client: &Client, cmd: &ClientCommand) -> ExitCode {
    if let ClientCommand::Status { json } = cmd {
        return status(client, *json);
    }
    send_and_print(name, client, &cmd.request())
}

/// Send a request and print the response.  Responses starting with
/// `error:` go to stderr and fail the process.
pub fn send_and_print(name: &str, client: &Client, request: &Request) -> ExitCode {
    if !client.is_running() {
        eprintln!("{}: daemon not running", name);
        return ExitCode::FAILURE;
    }

    if request.is_subscribe() {
        let stdout = std::io::stdout();
        return report(client.stream(&request.to_string(), stdout.lock()));
    }

    match client.request(request) {
        Ok(resp) if resp.starts_with("error:") => {
            eprintln!("{}", resp);
            ExitCode::FAILURE
        }
        Ok(resp) => {
            println!("{}", resp);
            ExitCode::SUCCESS
        }
        Err(e) => report(Err(e)),
    }
}

fn status(client: &Client, json: bool) -> ExitCode {
    if !client.is_running() {
        if json {
            println!(r#"{{"status":"not running"}}"#);
        } else {
            println!("not running");
        }
        return ExitCode::FAILURE;
    }
    if !json {
        println!("running");
        return ExitCode::SUCCESS;
    }
    match client.request(&Request::State) {
        Ok(resp) => {
            println!("{}", resp);
            ExitCode::SUCCESS
        }
        Err(e) => report(Err(e)),
    }
}

fn report(result: Result<(), ClientError>) -> ExitCode {
    match result {
        Ok(()) => {
            let _ = std::io::stdout().flush();
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
