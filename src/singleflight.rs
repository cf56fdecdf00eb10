//! Per-key deduplication of concurrent work.
//!
//! [`SingleFlight`] guarantees that for a given key at most one computation is
//! in flight at any time. Callers that arrive while a computation is running
//! wait for it and receive a clone of its output, including failures. Once the
//! computation finishes the key is released, so a later call starts fresh.
//!
//! Callers that publish successful results into their own cache should do so
//! from inside the computation. That way any caller arriving after the key is
//! released already sees the published value.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Deduplicates concurrent computations keyed by `K`.
pub struct SingleFlight<K, V> {
    in_flight: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `compute` for `key` unless a computation for the same key is
    /// already running, in which case wait for that one instead.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = cell.get_or_init(compute).await.clone();

        // Release the key, unless a newer flight already replaced ours
        let mut in_flight = self.in_flight.lock().await;
        if let Some(current) = in_flight.get(&key) {
            if Arc::ptr_eq(current, &cell) {
                in_flight.remove(&key);
            }
        }

        value
    }

    /// Number of keys with a computation currently running.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
