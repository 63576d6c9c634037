use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

/// Capacity of the change notification channel. Slow subscribers lag and
/// skip ahead instead of blocking writers.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that the value stored under `key` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// A shared string key-value substrate.
///
/// Any number of clients may hold the same store; every mutation that changes
/// a value is announced to subscribers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    /// Atomically replace the value under `key` with `new` (removing it when
    /// `None`) only if the current value equals `expected`.
    ///
    /// On mismatch nothing is written and the current value is returned.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<String>,
    ) -> Result<(), Option<String>>;

    /// Atomically write `new` under `key` (removing it when `None`) only while
    /// `guard_key` holds `guard`.
    ///
    /// On mismatch nothing is written and the guard's current value is returned.
    fn set_guarded(
        &self,
        guard_key: &str,
        guard: &str,
        key: &str,
        new: Option<String>,
    ) -> Result<(), Option<String>>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-process store shared by every client holding a handle to it.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, key: &str) {
        // No receiver is not an error: nobody is listening yet.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
    }

    fn write(entries: &mut HashMap<String, String>, key: &str, value: Option<String>) -> bool {
        match value {
            Some(value) => entries.insert(key.to_string(), value.clone()).as_ref() != Some(&value),
            None => entries.remove(key).is_some(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let changed = Self::write(&mut self.entries(), key, Some(value));
        if changed {
            self.notify(key);
        }
    }

    fn remove(&self, key: &str) {
        let changed = Self::write(&mut self.entries(), key, None);
        if changed {
            self.notify(key);
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<String>,
    ) -> Result<(), Option<String>> {
        let changed = {
            let mut entries = self.entries();
            let current = entries.get(key).map(String::as_str);
            if current != expected {
                return Err(current.map(str::to_string));
            }
            Self::write(&mut entries, key, new)
        };
        if changed {
            self.notify(key);
        }
        Ok(())
    }

    fn set_guarded(
        &self,
        guard_key: &str,
        guard: &str,
        key: &str,
        new: Option<String>,
    ) -> Result<(), Option<String>> {
        let changed = {
            let mut entries = self.entries();
            let current = entries.get(guard_key).map(String::as_str);
            if current != Some(guard) {
                return Err(current.map(str::to_string));
            }
            Self::write(&mut entries, key, new)
        };
        if changed {
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
