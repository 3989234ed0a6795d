//! `hyprd` command verbs: `ws` and `focus`.

use super::client::{HyprlandClient, HyprlandError, Window};

/// Why a `hyprd` verb failed.  Rendered to clients as `error: <message>`.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("workspace number required")]
    MissingWorkspace,
    #[error("invalid workspace: {0}")]
    InvalidWorkspace(String),
    #[error("class required")]
    MissingClass,
    #[error(transparent)]
    Hyprland(#[from] HyprlandError),
}

/// Handles the verbs `hyprd` adds on top of the built-in commands.
pub struct Commands {
    hypr: HyprlandClient,
}

impl Commands {
    pub fn new(hypr: HyprlandClient) -> Self {
        Self { hypr }
    }

    /// Answer `verb arg`, or `None` if the verb is not ours.
    pub fn handle(&self, verb: &str, arg: &str) -> Option<String> {
        let response = match verb {
            "ws" => self.ws(arg),
            "focus" => {
                let (class, title) = split_class_title(arg);
                self.focus(class, title)
            }
            _ => return None,
        };
        Some(response.unwrap_or_else(|e| format!("error: {}", e)))
    }

    /// Switch to workspace `arg`.
    pub fn ws(&self, arg: &str) -> Result<String, CommandError> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(CommandError::MissingWorkspace);
        }
        let ws: i64 = arg
            .parse()
            .map_err(|_| CommandError::InvalidWorkspace(arg.to_string()))?;
        self.hypr.dispatch(&format!("workspace {}", ws))?;
        Ok(format!("ws {}", ws))
    }

    /// Focus the best window matching `class` / `title`.
    pub fn focus(&self, class: &str, title: &str) -> Result<String, CommandError> {
        if class.is_empty() {
            return Err(CommandError::MissingClass);
        }
        let current = self.hypr.active_workspace()?;
        let windows = self.hypr.clients()?;

        let Some(target) = find_window(&windows, class, title, current) else {
            return Ok(format!("not found: {} {}", class, title));
        };
        self.hypr
            .dispatch(&format!("focuswindow address:{}", target.address))?;
        Ok(format!("focused: {} ({})", target.title, target.address))
    }
}

/// `class [title...]`: the title may contain spaces.
fn split_class_title(arg: &str) -> (&str, &str) {
    let arg = arg.trim();
    match arg.split_once(char::is_whitespace) {
        Some((class, title)) => (class, title.trim()),
        None => (arg, ""),
    }
}

/// An exact title match, or failing that a case-insensitive class match.
fn matches(w: &Window, class: &str, title: &str) -> bool {
    (!title.is_empty() && w.title == title)
        || (!class.is_empty() && w.class.eq_ignore_ascii_case(class))
}

/// Pick the window to focus.  Exact title matches beat class-only matches,
/// and within each, windows on the `current` workspace come first.
pub fn find_window<'a>(
    windows: &'a [Window],
    class: &str,
    title: &str,
    current: i64,
) -> Option<&'a Window> {
    windows
        .iter()
        .filter(|w| matches(w, class, title))
        .min_by_key(|w| {
            let title_miss = title.is_empty() || w.title != title;
            let elsewhere = w.workspace.id != current;
            (title_miss, elsewhere)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyprland::client::tests::FakeHyprland;
    use crate::hyprland::client::WorkspaceRef;

    fn window(addr: &str, ws: i64, class: &str, title: &str) -> Window {
        Window {
            address: addr.into(),
            workspace: WorkspaceRef {
                id: ws,
                name: ws.to_string(),
            },
            class: class.into(),
            title: title.into(),
        }
    }

    #[test]
    fn split_keeps_spaces_in_title() {
        assert_eq!(split_class_title("firefox Mozilla Firefox"), ("firefox", "Mozilla Firefox"));
        assert_eq!(split_class_title("kitty"), ("kitty", ""));
        assert_eq!(split_class_title(""), ("", ""));
    }

    #[test]
    fn prefers_current_workspace() {
        let windows = vec![
            window("0x1", 2, "kitty", "a"),
            window("0x2", 5, "Kitty", "b"),
        ];
        assert_eq!(find_window(&windows, "kitty", "", 5).unwrap().address, "0x2");
        assert_eq!(find_window(&windows, "kitty", "", 9).unwrap().address, "0x1");
    }

    #[test]
    fn exact_title_beats_class() {
        let windows = vec![
            window("0x1", 1, "firefox", "Inbox"),
            window("0x2", 3, "chromium", "Docs"),
        ];
        let w = find_window(&windows, "firefox", "Docs", 1).unwrap();
        assert_eq!(w.address, "0x2");
    }

    #[test]
    fn no_match() {
        let windows = vec![window("0x1", 1, "kitty", "zsh")];
        assert!(find_window(&windows, "firefox", "", 1).is_none());
    }

    fn fake() -> FakeHyprland {
        FakeHyprland::start(|req| match req {
            "j/activeworkspace" => r#"{"id": 2}"#.into(),
            "j/clients" => r#"[{"address":"0xa","workspace":{"id":1,"name":"1"},"class":"kitty","title":"one"},
                              {"address":"0xb","workspace":{"id":2,"name":"2"},"class":"kitty","title":"two"}]"#
                .into(),
            r if r.starts_with("dispatch ") => "ok".into(),
            _ => "unknown request".into(),
        })
    }

    #[test]
    fn ws_verb() {
        let fake = fake();
        let cmds = Commands::new(fake.client());
        assert_eq!(cmds.handle("ws", "3").unwrap(), "ws 3");
        assert_eq!(cmds.handle("ws", "").unwrap(), "error: workspace number required");
        assert_eq!(cmds.handle("ws", "three").unwrap(), "error: invalid workspace: three");
        assert!(fake.requests().contains(&"dispatch workspace 3".to_string()));
    }

    #[test]
    fn focus_verb() {
        let fake = fake();
        let cmds = Commands::new(fake.client());
        assert_eq!(cmds.handle("focus", "kitty").unwrap(), "focused: two (0xb)");
        assert_eq!(cmds.handle("focus", "").unwrap(), "error: class required");
        assert_eq!(cmds.handle("focus", "firefox mail").unwrap(), "not found: firefox mail");
        assert!(fake
            .requests()
            .contains(&"dispatch focuswindow address:0xb".to_string()));
    }

    #[test]
    fn typed_errors() {
        let fake = fake();
        let cmds = Commands::new(fake.client());
        assert!(matches!(cmds.ws(" "), Err(CommandError::MissingWorkspace)));
        assert!(matches!(cmds.ws("x"), Err(CommandError::InvalidWorkspace(w)) if w == "x"));
        assert!(matches!(cmds.focus("", "t"), Err(CommandError::MissingClass)));

        let offline = Commands::new(HyprlandClient::with_socket("/nonexistent/deskd/.socket.sock"));
        let err = offline.ws("2").unwrap_err();
        assert!(matches!(err, CommandError::Hyprland(_)));
        assert_eq!(
            offline.handle("ws", "2").unwrap(),
            format!("error: {}", err)
        );
    }

    #[test]
    fn other_verbs_pass_through() {
        let cmds = Commands::new(HyprlandClient::with_socket("/nonexistent"));
        assert!(cmds.handle("layout", "").is_none());
    }
}
