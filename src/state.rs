//! Topic-keyed state storage shared between providers and the server.
//!
//! The store holds at most one JSON value per topic.  A write replaces the
//! previous value for that topic entirely; there is no merging.  Every
//! access goes through a single [`RwLock`], so readers never observe a
//! half-written value.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The one way producers mutate shared state.
pub trait StateSetter: Send + Sync {
    fn set(&self, topic: &str, value: Value);
}

/// Lock-protected map from topic to its current value.
#[derive(Debug, Default)]
pub struct StateStore {
    data: RwLock<BTreeMap<String, Value>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value stored for `topic`.
    pub fn set(&self, topic: &str, value: Value) {
        self.write().insert(topic.to_string(), value);
    }

    /// Current value for `topic`, or `None` if the topic was never set.
    ///
    /// A topic explicitly set to JSON `null` returns `Some(Value::Null)`.
    pub fn get(&self, topic: &str) -> Option<Value> {
        self.read().get(topic).cloned()
    }

    /// Snapshot of every topic.  The lock is released before returning.
    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.read().clone()
    }

    /// Serialize the whole map as a JSON object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let data = self.read();
        let object: Map<String, Value> = data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::to_string(&object)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl StateSetter for StateStore {
    fn set(&self, topic: &str, value: Value) {
        StateStore::set(self, topic, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn get_unknown_topic_is_none() {
        let store = StateStore::new();
        assert_eq!(store.get("gpu"), None);
    }

    #[test]
    fn null_is_distinct_from_absent() {
        let store = StateStore::new();
        store.set("monocle", Value::Null);
        assert_eq!(store.get("monocle"), Some(Value::Null));
    }

    #[test]
    fn set_replaces_without_merging() {
        let store = StateStore::new();
        store.set("gpu", json!({"gpu_busy": "42", "vram": "1G"}));
        store.set("gpu", json!({"gpu_busy": "7"}));
        assert_eq!(store.get("gpu"), Some(json!({"gpu_busy": "7"})));
    }

    #[test]
    fn get_all_is_a_detached_copy() {
        let store = StateStore::new();
        store.set("a", json!(1));
        let snapshot = store.get_all();
        store.set("a", json!(2));
        store.set("b", json!(3));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["a"], json!(1));
    }

    #[test]
    fn to_json_serializes_whole_map() {
        let store = StateStore::new();
        assert_eq!(store.to_json().unwrap(), "{}");
        store.set("gpu", json!({"gpu_busy": "42"}));
        store.set("date", json!({"day": "01"}));
        let parsed: Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        assert_eq!(parsed, json!({"gpu": {"gpu_busy": "42"}, "date": {"day": "01"}}));
    }

    #[test]
    fn concurrent_writers_never_tear() {
        let store = Arc::new(StateStore::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        store.set("t", json!({"writer": i, "n": n, "pair": [i, n]}));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            if let Some(v) = store.get("t") {
                assert_eq!(v["pair"][0], v["writer"]);
                assert_eq!(v["pair"][1], v["n"]);
            }
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
