//! Core traits that decouple the daemon core from the things that produce
//! state.
//!
//! A [`Provider`] is a background task that owns one topic: it computes new
//! data and hands it to its [`Publisher`].  Providers that also accept
//! imperative commands (`action <provider> ...`) implement
//! [`ActionProvider`] and expose it through [`Provider::as_action`].

use crate::hub::Hub;
use crate::shutdown::Shutdown;
use log::warn;
use serde::Serialize;
use std::sync::Arc;

/// Error reported by a provider.  The message is shown to clients verbatim
/// after `error: `.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(String);

impl ProviderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A background producer of state for one topic.
///
/// # Contract
///
/// * [`start`](Provider::start) **blocks** until `shutdown` fires or
///   [`stop`](Provider::stop) is called.  The daemon runs each provider on
///   its own thread.
/// * Transient failures inside the loop are logged and skipped; returning
///   `Err` ends only this provider.
pub trait Provider: Send + Sync {
    /// Provider identifier, also its topic name.
    fn name(&self) -> &str;

    /// Run until shutdown, publishing through `publisher`.
    fn start(&self, shutdown: Shutdown, publisher: Publisher) -> Result<(), ProviderError>;

    /// Ask a running [`start`](Provider::start) to return.
    fn stop(&self) -> Result<(), ProviderError>;

    /// The action capability, if this provider has one.
    fn as_action(&self) -> Option<&dyn ActionProvider> {
        None
    }
}

/// A provider that also handles `action <name> [args...]`.
pub trait ActionProvider: Provider {
    /// Handle the words after the provider name.  The returned string is
    /// sent to the client as-is.
    fn handle_action(&self, args: &[String]) -> Result<String, ProviderError>;
}

/// Publishing handle bound to one topic.
///
/// [`publish`](Publisher::publish) stores the value and broadcasts it in
/// one step, so the stored state and what subscribers saw never diverge.
#[derive(Clone)]
pub struct Publisher {
    topic: String,
    hub: Arc<Hub>,
}

impl Publisher {
    pub(crate) fn new(topic: impl Into<String>, hub: Arc<Hub>) -> Self {
        Self {
            topic: topic.into(),
            hub,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publish<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.hub.publish(&self.topic, v),
            Err(e) => warn!("{}: cannot serialize state: {}", self.topic, e),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("topic", &self.topic).finish()
    }
}
