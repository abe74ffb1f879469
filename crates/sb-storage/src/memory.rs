//! In-memory storage backend

use std::collections::HashMap;

use parking_lot::RwLock;
use sb_types::AppResult;
use tokio::sync::broadcast;

use crate::backend::{StorageBackend, StorageChange};

/// Capacity of the change-notification channel. A slow subscriber observes a
/// `Lagged` error instead of blocking writers.
const CHANNEL_CAPACITY: usize = 16;

/// Process-local [`StorageBackend`] backed by a `HashMap`.
///
/// Does not survive restarts; production code wires in the host's durable
/// store instead. Change notifications behave identically to the durable
/// backends: every write and effective removal is broadcast, including to the
/// handle that performed it.
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageChange>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        let old_value = self
            .entries
            .write()
            .insert(key.to_string(), value.to_string());
        let _ = self.events.send(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let old_value = self.entries.write().remove(key);
        if old_value.is_some() {
            let _ = self.events.send(StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.events.subscribe()
    }
}
