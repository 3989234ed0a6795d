//! Daemon lifecycle and the built-in command set.
//!
//! A [`Daemon`] wires one [`Hub`] to one [`Server`], runs each registered
//! [`Provider`] on its own thread, and answers the commands every daemon
//! shares (`status`, `ping`, `state`, `query`, `action`).  Daemon-specific
//! verbs go to an optional [`ExtensionHandler`].

use crate::command::Request;
use crate::hub::Hub;
use crate::ipc::server::{CommandHandler, Server, ServerError, SubscribeHandler};
use crate::ipc::subscribe::Subscriber;
use crate::shutdown::Shutdown;
use crate::traits::Provider;
use log::{error, info};
use nix::sys::signal::{SigSet, Signal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handles a verb the built-in set does not know.  Returns `None` to let
/// the daemon answer `unknown command: <verb>`.
pub type ExtensionHandler = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Routes one command line to a response string.
///
/// Shared by the server's connection threads; never fails, errors are
/// rendered as `error: <message>`.
pub struct Dispatcher {
    hub: Arc<Hub>,
    providers: Vec<Arc<dyn Provider>>,
    known_topics: Option<Vec<String>>,
    extension: Option<ExtensionHandler>,
}

impl Dispatcher {
    pub fn handle(&self, command: &str) -> String {
        match Request::parse(command) {
            Request::Status => "running".to_string(),
            Request::Ping => "pong".to_string(),
            Request::State | Request::Query(None) => self.full_state(),
            Request::Query(Some(topic)) => self.query(&topic),
            Request::Action {
                provider: None, ..
            } => "error: provider name required".to_string(),
            Request::Action {
                provider: Some(name),
                args,
            } => self.action(&name, &args),
            // Subscriptions are taken over by the server before dispatch.
            Request::Subscribe(_) => "error: subscribe needs a streaming connection".to_string(),
            Request::Other { verb, arg } => self
                .extension
                .as_ref()
                .and_then(|ext| ext(&verb, &arg))
                .unwrap_or_else(|| format!("unknown command: {}", verb)),
        }
    }

    fn full_state(&self) -> String {
        match self.hub.state().to_json() {
            Ok(json) => json,
            Err(e) => format!("error: {}", e),
        }
    }

    fn query(&self, topic: &str) -> String {
        if let Some(known) = &self.known_topics {
            if !known.iter().any(|t| t == topic) {
                return format!("error: unknown topic: {}", topic);
            }
        }
        match self.hub.state().get(topic) {
            None => "null".to_string(),
            Some(value) => serde_json::to_string(&value).unwrap_or_else(|e| format!("error: {}", e)),
        }
    }

    fn action(&self, name: &str, args: &[String]) -> String {
        let Some(provider) = self.providers.iter().find(|p| p.name() == name) else {
            return format!("error: unknown provider: {}", name);
        };
        let Some(action) = provider.as_action() else {
            return format!("error: {} does not support actions", name);
        };
        match action.handle_action(args) {
            Ok(result) => result,
            Err(e) => format!("error: {}", e),
        }
    }
}

/// One daemon process: socket server, shared state and providers.
pub struct Daemon {
    name: String,
    path: PathBuf,
    mode: u32,
    hub: Arc<Hub>,
    providers: Vec<Arc<dyn Provider>>,
    known_topics: Option<Vec<String>>,
    extension: Option<ExtensionHandler>,
    shutdown: Shutdown,
    server: Option<Server>,
    workers: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// `name` prefixes log lines; `path` is the socket path.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            mode: 0o600,
            hub: Arc::new(Hub::new()),
            providers: Vec::new(),
            known_topics: None,
            extension: None,
            shutdown: Shutdown::new(),
            server: None,
            workers: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Restrict `query <topic>` to a fixed topic set; anything else answers
    /// `error: unknown topic: <topic>`.
    pub fn with_topics(mut self, topics: &[&str]) -> Self {
        self.known_topics = Some(topics.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_extension(mut self, handler: ExtensionHandler) -> Self {
        self.extension = Some(handler);
        self
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The signal every background thread of this daemon observes.
    pub fn done(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            hub: self.hub.clone(),
            providers: self.providers.clone(),
            known_topics: self.known_topics.clone(),
            extension: self.extension.clone(),
        }
    }

    /// Bind the socket and launch every provider.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let dispatcher = Arc::new(self.dispatcher());
        let handler: CommandHandler = Arc::new(move |cmd: &str| dispatcher.handle(cmd));

        let hub = self.hub.clone();
        let on_subscribe: SubscribeHandler =
            Arc::new(move |sub: &Subscriber, _topics: &[String]| hub.send_snapshot(sub));

        let mut server = Server::new(&self.path, handler)
            .with_mode(self.mode)
            .with_registry(self.hub.subscriptions().clone())
            .with_shutdown(self.shutdown.clone())
            .on_subscribe(on_subscribe);
        server.start()?;
        self.server = Some(server);

        for provider in &self.providers {
            let provider = provider.clone();
            let publisher = self.hub.publisher(provider.name());
            let token = self.shutdown.child();
            let daemon = self.name.clone();
            let handle = std::thread::Builder::new()
                .name(format!("provider-{}", provider.name()))
                .spawn(move || {
                    if let Err(e) = provider.start(token, publisher) {
                        error!("{}: provider {} error: {}", daemon, provider.name(), e);
                    }
                })?;
            self.workers.push(handle);
        }
        info!("{}: started {} provider(s)", self.name, self.providers.len());
        Ok(())
    }

    /// Run a background task that should end with the daemon.
    pub fn spawn_task<F>(&mut self, name: &str, task: F) -> std::io::Result<()>
    where
        F: FnOnce(Shutdown) + Send + 'static,
    {
        let token = self.shutdown.child();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || task(token))?;
        self.workers.push(handle);
        Ok(())
    }

    /// Stop the server and every provider, then join their threads.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        if let Some(mut server) = self.server.take() {
            server.shutdown();
        }
        for provider in &self.providers {
            if let Err(e) = provider.stop() {
                error!("{}: stopping {}: {}", self.name, provider.name(), e);
            }
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("{}: a background thread panicked", self.name);
            }
        }
    }

    /// Start, block until SIGINT/SIGTERM, then shut down.
    ///
    /// Signals are masked before any thread is spawned so that only the
    /// calling thread receives them.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let signals = block_termination_signals().map_err(std::io::Error::from)?;
        self.start()?;
        match signals.wait() {
            Ok(sig) => info!("{}: received {:?}, shutting down", self.name, sig),
            Err(e) => error!("{}: waiting for signals failed: {}", self.name, e),
        }
        self.shutdown();
        Ok(())
    }
}

/// Block SIGINT and SIGTERM on the calling thread (inherited by threads it
/// spawns afterwards) and return the set to `wait` on.
pub fn block_termination_signals() -> nix::Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block()?;
    Ok(set)
}

//  Tests
