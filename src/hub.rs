//! The state store and subscription registry, owned together.
//!
//! One [`Hub`] exists per daemon and is passed by `Arc` to the server's
//! callbacks and to every provider's [`Publisher`].

use crate::ipc::subscribe::{Subscriber, SubscriptionRegistry};
use crate::state::{StateSetter, StateStore};
use crate::traits::Publisher;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Hub {
    state: StateStore,
    subs: Arc<SubscriptionRegistry>,
    publish_lock: Mutex<()>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// The registry to hand to [`Server::with_registry`](crate::ipc::server::Server::with_registry).
    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subs
    }

    /// Store `value` under `topic` and broadcast it.
    ///
    /// Publishes are serialized so the last value stored for a topic is also
    /// the last one broadcast for it.
    pub fn publish(&self, topic: &str, value: Value) {
        let _guard = self.publish_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.state.set(topic, value.clone());
        self.subs.notify(topic, &value);
    }

    /// A [`Publisher`] bound to `topic`.
    pub fn publisher(self: &Arc<Self>, topic: &str) -> Publisher {
        Publisher::new(topic, self.clone())
    }

    /// Replay current state to a new subscriber: one event per stored,
    /// non-null topic it wants, in topic order.
    pub fn send_snapshot(&self, sub: &Subscriber) {
        for (topic, data) in self.state.get_all() {
            if !data.is_null() && sub.wants(&topic) {
                sub.send_event(&topic, &data);
            }
        }
    }
}

impl StateSetter for Hub {
    fn set(&self, topic: &str, value: Value) {
        self.state.set(topic, value);
    }
}
