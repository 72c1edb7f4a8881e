//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::channel::mpsc;
use tempfile::TempDir;

use crate::bus::{BusError, DeliveryEvent, EventBus};
use crate::config::Config;
use crate::relay::ConnectionWriter;
use crate::storage::models::AccessCode;
use crate::storage::{CodeStore, Database, DatabaseError, MemoryCodeStore, StoreError};
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// Create an unused `AccessCode` minted at `created`.
pub fn make_code(code: &str, created: i64, ttl_seconds: u64) -> AccessCode {
    AccessCode::new(code.to_string(), created, ttl_seconds)
}

/// Defaults with an ephemeral bind address.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config
}

/// `AppState` over an in-memory store and a [`RecordingBus`].
pub fn test_state() -> Arc<AppState> {
    test_state_with(
        Arc::new(MemoryCodeStore::new()),
        Arc::new(RecordingBus::new()),
    )
}

pub fn test_state_with(store: Arc<dyn CodeStore>, bus: Arc<dyn EventBus>) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), store, bus))
}

/// A writer over an unbounded channel, plus the receiving end.
pub fn channel_writer() -> (
    Arc<ConnectionWriter<mpsc::UnboundedSender<Message>>>,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded();
    (
        Arc::new(ConnectionWriter::new(tx, Duration::from_secs(1))),
        rx,
    )
}

/// Event bus that keeps every published event in memory.
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<DeliveryEvent>>,
    fail: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transport error.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event: &DeliveryEvent) -> Result<(), BusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Transport("publish disabled".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Code store whose every call fails, counting how often it was asked.
#[derive(Default)]
pub struct UnavailableStore {
    calls: AtomicUsize,
}

impl UnavailableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database(DatabaseError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "store unavailable",
        ))))
    }
}

#[async_trait]
impl CodeStore for UnavailableStore {
    async fn create(&self, _code: &AccessCode) -> Result<(), StoreError> {
        self.fail()
    }

    async fn current_active(
        &self,
        _ttl_seconds: u64,
        _now: i64,
    ) -> Result<Option<AccessCode>, StoreError> {
        self.fail()
    }

    async fn get(&self, _code: &str) -> Result<AccessCode, StoreError> {
        self.fail()
    }

    async fn mark_used(&self, _code: &str, _ts: i64) -> Result<(), StoreError> {
        self.fail()
    }

    async fn next_after(&self, _code: &str, _ts: i64) -> Result<Option<AccessCode>, StoreError> {
        self.fail()
    }

    async fn delete_expired(&self, _cutoff: i64) -> Result<usize, StoreError> {
        self.fail()
    }
}
