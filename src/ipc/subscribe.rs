//! Subscriber bookkeeping and event fan-out.
//!
//! # Wire format
//!
//! Each event is one line of JSON followed by `\n`:
//!
//! ```json
//! {"event":"workspace","data":{"current":3,"occupied":[1,3]}}
//! {"event":"timer","data":{"timer":"01:29","alarm":"18:00","timer_active":true,"alarm_active":false}}
//! ```
//!
//! # Ordering
//!
//! [`SubscriptionRegistry::subscribe`] runs the caller's snapshot callback
//! while holding the registry's write lock and only then inserts the
//! subscriber.  A concurrent [`notify`](SubscriptionRegistry::notify) needs
//! the read lock, so it either runs entirely before the subscriber exists or
//! entirely after its snapshot has been written.

use crate::command::WILDCARD;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::net::Shutdown as SocketShutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The frame pushed to subscribers.
#[derive(Debug, Serialize)]
pub struct Event<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

/// Encode one newline-terminated event frame.
pub fn encode_event(topic: &str, data: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(&Event { event: topic, data })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Registry-assigned identity of a subscriber.
pub type SubscriberId = u64;

/// One open streaming connection and the topics it asked for.
///
/// The topic set is fixed at creation.  Writes go through a per-subscriber
/// mutex, so a broadcast and a directed send never interleave on the wire.
/// A second handle outside that mutex lets [`close`](Self::close) reach a
/// socket whose writer is blocked on a peer that stopped reading.
pub struct Subscriber {
    id: SubscriberId,
    topics: HashSet<String>,
    conn: Mutex<UnixStream>,
    closer: Option<UnixStream>,
}

impl Subscriber {
    fn new(id: SubscriberId, conn: UnixStream, topics: &[String]) -> Self {
        let closer = match conn.try_clone() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("subscriber {}: cannot clone socket for shutdown: {}", id, e);
                None
            }
        };
        Self {
            id,
            topics: topics.iter().cloned().collect(),
            conn: Mutex::new(conn),
            closer,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// `true` if this subscriber asked for `topic` or for everything.
    pub fn wants(&self, topic: &str) -> bool {
        self.topics.contains(topic) || self.topics.contains(WILDCARD)
    }

    /// Send a single event to this subscriber only.
    pub fn send_event(&self, topic: &str, data: &Value) {
        match encode_event(topic, data) {
            Ok(frame) => self.write_frame(&frame),
            Err(e) => debug!("cannot encode {} event: {}", topic, e),
        }
    }

    /// Write one already-encoded frame.  A dead peer is not an error here:
    /// the connection's own handler notices and unsubscribes it.
    fn write_frame(&self, frame: &[u8]) {
        let mut conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = conn.write_all(frame) {
            debug!("subscriber {} write failed: {}", self.id, e);
        }
    }

    /// Shut the socket down.  Never waits on the write mutex; a writer
    /// blocked in `write_all` fails with `EPIPE` and releases it.
    fn close(&self) {
        match &self.closer {
            Some(closer) => {
                let _ = closer.shutdown(SocketShutdown::Both);
            }
            None => {
                let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
                let _ = conn.shutdown(SocketShutdown::Both);
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("topics", &self.topics)
            .finish()
    }
}

/// All live subscribers, in the order they subscribed.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` for `topics`.
    ///
    /// `on_subscribe` runs before the subscriber becomes visible to
    /// [`notify`](Self::notify), so anything it sends arrives ahead of live
    /// events.
    pub fn subscribe<F>(&self, conn: UnixStream, topics: &[String], on_subscribe: F) -> SubscriberId
    where
        F: FnOnce(&Subscriber),
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber::new(id, conn, topics));

        let mut subscribers = self.write();
        on_subscribe(&sub);
        subscribers.push(sub);
        debug!("subscriber {} added for {:?}", id, topics);
        id
    }

    /// Remove a subscriber.  Unknown or already-removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.write();
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            subscribers.remove(pos);
            debug!("subscriber {} removed", id);
        }
    }

    /// Broadcast `data` under `topic` to every interested subscriber.
    ///
    /// The frame is encoded once.  A slow subscriber delays this call until
    /// its write finishes; it never affects the bytes another subscriber sees.
    pub fn notify(&self, topic: &str, data: &Value) {
        let frame = match encode_event(topic, data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("cannot encode {} event: {}", topic, e);
                return;
            }
        };

        for sub in self.read().iter().filter(|s| s.wants(topic)) {
            sub.write_frame(&frame);
        }
    }

    /// Shut down every subscriber socket so blocked readers return.
    pub fn close_all(&self) {
        for sub in self.read().iter() {
            sub.close();
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Subscriber>>> {
        self.subscribers.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Subscriber>>> {
        self.subscribers.write().unwrap_or_else(|p| p.into_inner())
    }
}

//  Tests
