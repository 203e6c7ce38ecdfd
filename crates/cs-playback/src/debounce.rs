//! Cancellable delayed tasks keyed by identity.
//!
//! Scheduling under a key aborts whatever was previously scheduled under the
//! same key, so only the most recent task for a key can ever fire.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::AbortHandle;

pub struct KeyedDebouncer<K>
where
    K: Eq + Hash,
{
    tasks: DashMap<K, AbortHandle>,
}

impl<K> KeyedDebouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Run `task` after `delay` unless something else is scheduled under
    /// `key` first.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        if let Some(previous) = self.tasks.insert(key, handle.abort_handle()) {
            previous.abort();
        }
    }

    pub fn cancel(&self, key: &K) {
        if let Some((_, handle)) = self.tasks.remove(key) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        self.tasks.retain(|_, handle| {
            handle.abort();
            false
        });
    }

    /// Number of keys with a task that has not finished yet.
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|e| !e.value().is_finished()).count()
    }
}

impl<K> Default for KeyedDebouncer<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for KeyedDebouncer<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
