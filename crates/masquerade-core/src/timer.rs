//! Timer registry — cancellable delayed callbacks keyed by the entity they
//! guard (waiting participant, debouncing typist).
//!
//! Cancellation aborts the sleep task, but it is not guaranteed to win a race
//! with a timer that already fired: the callback typically re-enters the
//! orchestrator as a command, and the receiving handler must re-check that
//! the session/participant is still live before acting.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct TimerRegistry<K> {
    handles: HashMap<K, JoinHandle<()>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> TimerRegistry<K> {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    /// Schedule `fire` to run after `delay`. An existing timer under the same
    /// key is cancelled first.
    pub fn schedule<F>(&mut self, key: K, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel(&key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        self.handles.insert(key, handle);
    }

    /// Cancel (or reap, if already fired) the timer under `key`.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.handles.remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.handles
            .get(key)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
