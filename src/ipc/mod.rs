//! Unix-socket IPC: the command server, the subscription registry that
//! streams events to open connections, and the matching client.
//!
//! External tools (eww widgets, key-bind scripts, the daemons' own CLI)
//! connect to the socket and send a single line command.

pub mod client;
pub mod server;
pub mod subscribe;
