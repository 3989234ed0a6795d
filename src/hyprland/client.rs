//! Hyprland IPC client.
//!
//! Talks to Hyprland directly through its Unix sockets at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/`:
//!
//! * `.socket.sock`: one request per connection (`j/<query>` for JSON,
//!   `dispatch <args>` for actions).
//! * `.socket2.sock`: newline-delimited event stream.

use serde::Deserialize;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Errors that can occur when talking to Hyprland.
#[derive(Debug, thiserror::Error)]
#[error("hyprland IPC error: {0}")]
pub struct HyprlandError(String);

/// Workspace reference embedded in window queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkspaceRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Subset of the JSON object returned by `j/clients`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Window {
    pub address: String,
    #[serde(default)]
    pub workspace: WorkspaceRef,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Deserialize)]
struct ActiveWorkspaceJson {
    id: i64,
}

/// Handle on one Hyprland instance.
///
/// No connection is held; each call opens a short-lived request.
#[derive(Debug, Clone)]
pub struct HyprlandClient {
    socket: PathBuf,
}

impl HyprlandClient {
    /// Resolve the instance from the environment.
    pub fn from_env() -> Result<Self, HyprlandError> {
        let sig = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").map_err(|_| {
            HyprlandError("HYPRLAND_INSTANCE_SIGNATURE not set, is Hyprland running?".into())
        })?;
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/run/user/{}", nix::unistd::getuid()));

        let socket = PathBuf::from(runtime_dir)
            .join("hypr")
            .join(sig)
            .join(".socket.sock");
        if !socket.exists() {
            return Err(HyprlandError(format!("socket not found: {}", socket.display())));
        }
        Ok(Self { socket })
    }

    /// Use an explicit command socket path.
    pub fn with_socket(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// The event socket next to the command socket.
    pub fn event_socket_path(&self) -> PathBuf {
        self.socket.with_file_name(".socket2.sock")
    }

    /// Send a raw command and return the response.
    pub fn request(&self, command: &str) -> Result<String, HyprlandError> {
        let mut stream = UnixStream::connect(&self.socket)
            .map_err(|e| HyprlandError(format!("connect to {}: {}", self.socket.display(), e)))?;

        stream
            .write_all(command.as_bytes())
            .map_err(|e| HyprlandError(format!("write: {}", e)))?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .map_err(|e| HyprlandError(format!("read: {}", e)))?;

        String::from_utf8(response).map_err(|e| HyprlandError(format!("utf-8: {}", e)))
    }

    fn json<T: for<'de> Deserialize<'de>>(&self, query: &str) -> Result<T, HyprlandError> {
        let raw = self.request(&format!("j/{}", query))?;
        serde_json::from_str(&raw).map_err(|e| HyprlandError(format!("parse {}: {}", query, e)))
    }

    /// Run a dispatcher and check for `ok`.
    pub fn dispatch(&self, args: &str) -> Result<(), HyprlandError> {
        let response = self.request(&format!("dispatch {}", args))?;
        if response.trim() == "ok" {
            Ok(())
        } else {
            Err(HyprlandError(format!("dispatch failed: {}", response)))
        }
    }

    /// Every window Hyprland manages.
    pub fn clients(&self) -> Result<Vec<Window>, HyprlandError> {
        self.json("clients")
    }

    /// Id of the focused workspace.
    pub fn active_workspace(&self) -> Result<i64, HyprlandError> {
        let ws: ActiveWorkspaceJson = self.json("activeworkspace")?;
        Ok(ws.id)
    }

    /// Open the event stream.
    pub fn connect_events(&self) -> Result<UnixStream, HyprlandError> {
        let path = self.event_socket_path();
        UnixStream::connect(&path)
            .map_err(|e| HyprlandError(format!("connect to {}: {}", path.display(), e)))
    }
}

/// Sorted, unique ids of regular workspaces holding at least one window.
/// Special workspaces have non-positive ids and are skipped.
pub fn occupied_workspaces(windows: &[Window]) -> Vec<i64> {
    let mut ids: Vec<i64> = windows
        .iter()
        .map(|w| w.workspace.id)
        .filter(|id| *id > 0)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
