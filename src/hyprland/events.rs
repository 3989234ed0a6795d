//! Workspace tracking from Hyprland's event socket.
//!
//! Events arrive as `event>>data` lines.  Only the ones that change the
//! focused workspace or the set of occupied workspaces matter here; each
//! change publishes the `workspace` topic.

use super::client::{occupied_workspaces, HyprlandClient};
use crate::shutdown::Shutdown;
use crate::traits::{Provider, ProviderError, Publisher};
use log::{debug, info, warn};
use serde::Serialize;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::Duration;

/// How often a blocked event read checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Published value of the `workspace` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceState {
    pub current: i64,
    pub occupied: Vec<i64>,
}

/// What a single event line means for [`WorkspaceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// Focus moved to this workspace.
    Focused(i64),
    /// Windows or workspaces came or went; occupancy must be re-read.
    Occupancy,
}

/// Interpret one `event>>data` line.  Unknown or malformed lines are `None`.
pub fn parse_event(line: &str) -> Option<WorkspaceEvent> {
    let (event, data) = line.split_once(">>")?;
    match event {
        "workspace" | "workspacev2" => {
            let id = data.split(',').next().unwrap_or(data);
            id.trim().parse().ok().map(WorkspaceEvent::Focused)
        }
        "focusedmon" => {
            let (_, id) = data.rsplit_once(',')?;
            id.trim().parse().ok().map(WorkspaceEvent::Focused)
        }
        "createworkspace" | "destroyworkspace" | "openwindow" | "closewindow" | "movewindow" => {
            Some(WorkspaceEvent::Occupancy)
        }
        _ => None,
    }
}

/// Follows the event socket and publishes [`WorkspaceState`].
pub struct WorkspaceTracker {
    hypr: HyprlandClient,
    stop: Shutdown,
}

impl WorkspaceTracker {
    pub fn new(hypr: HyprlandClient) -> Self {
        Self {
            hypr,
            stop: Shutdown::new(),
        }
    }

    fn sync(&self, state: &mut WorkspaceState) {
        match self.hypr.active_workspace() {
            Ok(id) => state.current = id,
            Err(e) => warn!("workspace: initial sync failed: {}", e),
        }
        self.refresh_occupied(state);
    }

    fn refresh_occupied(&self, state: &mut WorkspaceState) {
        match self.hypr.clients() {
            Ok(windows) => state.occupied = occupied_workspaces(&windows),
            Err(e) => warn!("workspace: cannot list clients: {}", e),
        }
    }

    /// Apply one event line.  Returns `true` if anything should be published.
    fn apply(&self, line: &str, state: &mut WorkspaceState) -> bool {
        match parse_event(line) {
            Some(WorkspaceEvent::Focused(id)) => {
                state.current = id;
                true
            }
            Some(WorkspaceEvent::Occupancy) => {
                self.refresh_occupied(state);
                true
            }
            None => false,
        }
    }

    fn follow<R: Read>(
        &self,
        events: R,
        publisher: &Publisher,
        state: &mut WorkspaceState,
    ) -> Result<(), ProviderError> {
        let mut reader = BufReader::new(events);
        let mut line = Vec::new();
        loop {
            if self.stop.is_triggered() {
                return Ok(());
            }
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    if self.stop.is_triggered() {
                        return Ok(());
                    }
                    return Err(ProviderError::new("hyprland event socket closed"));
                }
                Ok(_) => {
                    if line.last() != Some(&b'\n') {
                        // Partial line at EOF, finish it on the next read.
                        continue;
                    }
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    debug!("workspace: event {}", text);
                    if self.apply(text, state) {
                        publisher.publish(&*state);
                    }
                    line.clear();
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    if self.stop.is_triggered() {
                        return Ok(());
                    }
                    return Err(ProviderError::new(format!("event read error: {}", e)));
                }
            }
        }
    }
}

impl Provider for WorkspaceTracker {
    fn name(&self) -> &str {
        "workspace"
    }

    fn start(&self, shutdown: Shutdown, publisher: Publisher) -> Result<(), ProviderError> {
        shutdown.link(&self.stop);

        let events = self
            .hypr
            .connect_events()
            .map_err(|e| ProviderError::new(e.to_string()))?;
        events
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| ProviderError::new(format!("event socket: {}", e)))?;
        info!("workspace: subscribed to hyprland events");

        let mut state = WorkspaceState::default();
        self.sync(&mut state);
        publisher.publish(&state);

        self.follow(events, &publisher, &mut state)
    }

    fn stop(&self) -> Result<(), ProviderError> {
        self.stop.trigger();
        Ok(())
    }
}
