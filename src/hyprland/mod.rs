//! Hyprland support for `hyprd`.
//!
//! Nothing outside this module should reference Hyprland directly.

pub mod client;
pub mod commands;
pub mod events;

pub use client::{HyprlandClient, HyprlandError};
pub use commands::Commands;
pub use events::{WorkspaceState, WorkspaceTracker};
