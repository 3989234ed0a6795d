//! Unix-socket command server.
//!
//! Binds a Unix stream socket and handles every accepted connection on its
//! own thread.  A connection carries exactly one command line:
//!
//! * `subscribe [topics...]` keeps the connection open and registers it
//!   with the [`SubscriptionRegistry`]; events are streamed until the peer
//!   disconnects or the server shuts down.
//! * Anything else is passed to the [`CommandHandler`], whose return value
//!   is written back before the connection is closed.

use super::subscribe::{Subscriber, SubscriptionRegistry};
use crate::command::Request;
use crate::shutdown::Shutdown;
use log::{debug, error, info};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Upper bound of a single command read.
pub const MAX_COMMAND_BYTES: usize = 4096;

/// Turns a one-shot command line into its response.
///
/// Handlers report failures in the returned string (`error: ...`); the
/// server never inspects it.
pub type CommandHandler = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Called once per new subscriber, before live events reach it.
pub type SubscribeHandler = Arc<dyn Fn(&Subscriber, &[String]) + Send + Sync>;

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("chmod socket {path}: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Socket lifecycle plus command routing.
pub struct Server {
    path: PathBuf,
    mode: u32,
    subs: Arc<SubscriptionRegistry>,
    handler: CommandHandler,
    on_subscribe: Option<SubscribeHandler>,
    done: Shutdown,
    listener: Option<Arc<UnixListener>>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Create a server for `path`.  Nothing is bound until
    /// [`start`](Self::start).
    pub fn new(path: impl AsRef<Path>, handler: CommandHandler) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: 0o600,
            subs: Arc::new(SubscriptionRegistry::new()),
            handler,
            on_subscribe: None,
            done: Shutdown::new(),
            listener: None,
            accept_thread: None,
        }
    }

    /// File mode applied to the socket after binding (default `0o600`).
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Share an existing registry instead of the server's own.
    pub fn with_registry(mut self, subs: Arc<SubscriptionRegistry>) -> Self {
        self.subs = subs;
        self
    }

    /// Use an externally owned shutdown signal.
    pub fn with_shutdown(mut self, done: Shutdown) -> Self {
        self.done = done;
        self
    }

    pub fn on_subscribe(mut self, f: SubscribeHandler) -> Self {
        self.on_subscribe = Some(f);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subs
    }

    /// The shutdown signal background tasks should watch.
    pub fn done(&self) -> Shutdown {
        self.done.clone()
    }

    /// Bind the socket and spawn the accept loop.
    ///
    /// Any stale socket file at the path is removed first.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let _ = std::fs::remove_file(&self.path);

        let listener = UnixListener::bind(&self.path).map_err(|source| ServerError::Bind {
            path: self.path.clone(),
            source,
        })?;

        if let Err(source) =
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(self.mode))
        {
            drop(listener);
            let _ = std::fs::remove_file(&self.path);
            return Err(ServerError::Permissions {
                path: self.path.clone(),
                source,
            });
        }

        info!("listening on {}", self.path.display());

        let listener = Arc::new(listener);
        let ctx = ConnectionContext {
            subs: self.subs.clone(),
            handler: self.handler.clone(),
            on_subscribe: self.on_subscribe.clone(),
            done: self.done.clone(),
        };
        let accept_listener = listener.clone();
        let handle = std::thread::Builder::new()
            .name("accept".into())
            .spawn(move || accept_loop(&accept_listener, ctx))?;

        self.listener = Some(listener);
        self.accept_thread = Some(handle);
        Ok(())
    }

    /// Stop accepting, disconnect subscribers and remove the socket file.
    ///
    /// Returns after the accept loop has exited.  Calling it again is a
    /// no-op.
    pub fn shutdown(&mut self) {
        self.done.trigger();

        if let Some(listener) = self.listener.take() {
            // Unblocks a pending accept(); fall back to a throwaway
            // connection if the platform refuses to shut down a listener.
            if nix::sys::socket::shutdown(listener.as_raw_fd(), nix::sys::socket::Shutdown::Both)
                .is_err()
            {
                let _ = UnixStream::connect(&self.path);
            }
            let _ = std::fs::remove_file(&self.path);
        }

        self.subs.close_all();

        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("accept loop panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.shutdown();
        }
    }
}

/// Everything a connection thread needs, cloned per connection.
#[derive(Clone)]
struct ConnectionContext {
    subs: Arc<SubscriptionRegistry>,
    handler: CommandHandler,
    on_subscribe: Option<SubscribeHandler>,
    done: Shutdown,
}

fn accept_loop(listener: &UnixListener, ctx: ConnectionContext) {
    for stream in listener.incoming() {
        if ctx.done.is_triggered() {
            break;
        }
        match stream {
            Ok(stream) => {
                let ctx = ctx.clone();
                let spawned = std::thread::Builder::new()
                    .name("client".into())
                    .spawn(move || handle_client(stream, &ctx));
                if let Err(e) = spawned {
                    error!("cannot spawn client thread: {}", e);
                }
            }
            Err(e) => {
                error!("accept error: {}", e);
            }
        }
    }
    debug!("accept loop exited");
}

fn handle_client(mut stream: UnixStream, ctx: &ConnectionContext) {
    let mut buf = [0u8; MAX_COMMAND_BYTES];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            debug!("client read failed: {}", e);
            return;
        }
    };

    let command = String::from_utf8_lossy(&buf[..n]).trim().to_string();
    debug!("received {:?}", command);

    if let Request::Subscribe(topics) = Request::parse(&command) {
        serve_subscriber(stream, &topics, ctx);
        return;
    }

    let response = (ctx.handler)(&command);
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("client went away before reply: {}", e);
    }
}

/// Register the connection and park until the peer disconnects or the
/// server shuts the socket down.
fn serve_subscriber(mut stream: UnixStream, topics: &[String], ctx: &ConnectionContext) {
    let writer = match stream.try_clone() {
        Ok(w) => w,
        Err(e) => {
            error!("cannot clone subscriber socket: {}", e);
            return;
        }
    };

    let id = ctx.subs.subscribe(writer, topics, |sub| {
        if let Some(on_subscribe) = &ctx.on_subscribe {
            on_subscribe(sub, topics);
        }
    });

    // Registered before this check, so a concurrent shutdown either is seen
    // here or closes the socket via `close_all`.
    if !ctx.done.is_triggered() {
        let mut sink = [0u8; 64];
        loop {
            match stream.read(&mut sink) {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }

    ctx.subs.unsubscribe(id);
    debug!("subscriber {} disconnected", id);
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Monotonic counter to generate unique socket paths per test.
    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("deskd-server-test-{}-{}.sock", std::process::id(), id))
    }

    fn echo_handler() -> CommandHandler {
        Arc::new(|cmd: &str| match cmd {
            "ping" => "pong".to_string(),
            other => format!("unknown command: {}", other),
        })
    }

    fn request(path: &Path, line: &str) -> String {
        let mut stream = UnixStream::connect(path).expect("connect");
        stream.write_all(line.as_bytes()).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn one_shot_request_gets_single_reply_then_eof() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();

        assert_eq!(request(&path, "ping\n"), "pong");
        assert_eq!(request(&path, "fooble"), "unknown command: fooble");

        server.shutdown();
    }

    #[test]
    fn start_replaces_stale_socket_file() {
        let path = tmp_socket_path();
        std::fs::write(&path, b"stale").unwrap();

        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();
        assert_eq!(request(&path, "ping"), "pong");
        server.shutdown();
    }

    #[test]
    fn start_applies_socket_mode() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler()).with_mode(0o666);
        server.start().unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o666);
        server.shutdown();
    }

    #[test]
    fn bind_failure_is_reported() {
        let path = std::env::temp_dir()
            .join("deskd-no-such-dir")
            .join("nested")
            .join("x.sock");
        let mut server = Server::new(&path, echo_handler());
        assert!(matches!(server.start(), Err(ServerError::Bind { .. })));
    }

    #[test]
    fn shutdown_removes_socket_and_joins_accept_loop() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();
        assert!(path.exists());

        server.shutdown();
        assert!(!path.exists());
        assert!(server.done().is_triggered());
        assert!(UnixStream::connect(&path).is_err());

        // Second shutdown must not panic.
        server.shutdown();
    }

    #[test]
    fn subscriber_gets_snapshot_then_live_events() {
        let path = tmp_socket_path();
        let on_sub: SubscribeHandler = Arc::new(|sub: &Subscriber, _topics: &[String]| {
            if sub.wants("gpu") {
                sub.send_event("gpu", &json!({"gpu_busy": "42"}));
            }
        });
        let mut server = Server::new(&path, echo_handler()).on_subscribe(on_sub);
        server.start().unwrap();

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"subscribe gpu").unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut first = String::new();
        reader.read_line(&mut first).unwrap();
        assert_eq!(first, "{\"event\":\"gpu\",\"data\":{\"gpu_busy\":\"42\"}}\n");

        server.subscriptions().notify("date", &json!("ignored"));
        server.subscriptions().notify("gpu", &json!({"gpu_busy": "7"}));
        let mut second = String::new();
        reader.read_line(&mut second).unwrap();
        assert_eq!(second, "{\"event\":\"gpu\",\"data\":{\"gpu_busy\":\"7\"}}\n");

        server.shutdown();
    }

    #[test]
    fn disconnect_unsubscribes() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"subscribe").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(server.subscriptions().len(), 1);

        drop(stream);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(server.subscriptions().len(), 0);

        server.shutdown();
    }

    #[test]
    fn shutdown_ends_open_subscriptions() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();

        let mut stream = UnixStream::connect(&path).unwrap();
        stream.write_all(b"subscribe workspace").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        server.shutdown();

        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut rest = Vec::new();
        // EOF (not a timeout) once the server closes our socket.
        assert!(stream.read_to_end(&mut rest).is_ok());
    }

    #[test]
    fn shutdown_returns_with_a_subscriber_that_stopped_reading() {
        let path = tmp_socket_path();
        let mut server = Server::new(&path, echo_handler());
        server.start().unwrap();

        // Subscribes, then never reads: its socket buffer fills up.
        let mut stalled = UnixStream::connect(&path).unwrap();
        stalled.write_all(b"subscribe").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(server.subscriptions().len(), 1);

        let subs = server.subscriptions().clone();
        let done = server.done();
        let flooder = std::thread::spawn(move || {
            let payload = json!("x".repeat(64 * 1024));
            while !done.is_triggered() {
                subs.notify("gpu", &payload);
            }
        });
        std::thread::sleep(Duration::from_millis(500));

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            server.shutdown();
            let _ = tx.send(());
        });
        assert!(
            rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "shutdown blocked behind a stalled subscriber write"
        );
        flooder.join().unwrap();
        assert!(!path.exists());
        drop(stalled);
    }
}
