//! **deskd**: small desktop-state daemons built on one pub/sub core.
//!
//! A daemon owns a Unix socket that answers one text command per
//! connection, except `subscribe`, which keeps the connection open and
//! streams `{"event": <topic>, "data": <value>}` lines.
//!
//! # Architecture
//!
//! * [`ipc::server::Server`] accepts connections, one thread each.
//! * [`hub::Hub`] pairs the [`state::StateStore`] with the
//!   [`ipc::subscribe::SubscriptionRegistry`]: publishing a topic records
//!   it and fans it out to subscribers.
//! * [`traits::Provider`] is the plugin seam.  Each provider runs on its
//!   own thread and publishes through a [`traits::Publisher`];
//!   [`traits::ActionProvider`]s also answer `action <name> ...`.
//! * [`daemon::Daemon`] wires those together, routes commands, and handles
//!   SIGINT/SIGTERM.
//!
//! Two binaries ship on top: `ewwd` ([`providers`]) and `hyprd`
//! ([`hyprland`]).

pub mod cli;
pub mod command;
pub mod config;
pub mod daemon;
pub mod hub;
pub mod hyprland;
pub mod ipc;
pub mod providers;
pub mod shutdown;
pub mod state;
pub mod traits;
