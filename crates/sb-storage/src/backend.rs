//! Storage trait consumed by the session lifecycle

use sb_types::AppResult;
use tokio::sync::broadcast;

/// A change observed on the durable store.
///
/// Fired for writes and removals originating from any handle, including the
/// subscriber's own.
#[derive(Debug, Clone)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Durable key/value storage.
///
/// Values survive process restarts and are visible to every execution
/// context, so consumers treat any copy they hold as advisory and re-read
/// before acting on it. Values are always replaced wholesale; partial writes
/// are never observable.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn read(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> AppResult<()>;

    /// Remove the value stored under `key`. Removing an absent key is a
    /// no-op.
    fn remove(&self, key: &str) -> AppResult<()>;

    /// Subscribe to change notifications for all keys.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}
