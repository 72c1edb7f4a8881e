//! Access-code persistence.
//!
//! [`CodeStore`] is the only interface the rest of the crate sees. Backends
//! are registered in [`STORE_PROVIDERS`] and selected once at startup by the
//! scheme of the configured descriptor.

mod codes;
pub mod db;
pub mod memory;
pub mod models;
mod tables;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::{Descriptor, DescriptorError};

pub use db::{Database, DatabaseError};
pub use memory::MemoryCodeStore;
pub use models::AccessCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("Access code not found: {0}")]
    NotFound(String),
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Unsupported store scheme '{scheme}' (available: {available})")]
    UnsupportedScheme { available: String, scheme: String },
}

/// Persistence contract for access-code records.
///
/// Implementations must tolerate concurrent callers. Only single-record
/// updates are atomic; nothing here spans multiple records.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Persist a newly minted code.
    async fn create(&self, code: &AccessCode) -> Result<(), StoreError>;

    /// The most recently created code with `created > now - ttl`.
    async fn current_active(
        &self,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<AccessCode>, StoreError>;

    /// Fetch a code, failing with [`StoreError::NotFound`] if absent.
    async fn get(&self, code: &str) -> Result<AccessCode, StoreError>;

    /// Set `last_update` on one record. Setting the same value twice is a no-op.
    async fn mark_used(&self, code: &str, ts: i64) -> Result<(), StoreError>;

    /// The earliest code other than `code` with `created > ts`.
    async fn next_after(&self, code: &str, ts: i64) -> Result<Option<AccessCode>, StoreError>;

    /// Delete every code with `expires < cutoff`, returning how many were removed.
    async fn delete_expired(&self, cutoff: i64) -> Result<usize, StoreError>;
}

type StoreProvider = fn(&Descriptor) -> Result<Arc<dyn CodeStore>, StoreError>;

/// Store backends keyed by descriptor scheme.
pub const STORE_PROVIDERS: &[(&str, StoreProvider)] = &[
    ("mem", open_memory as StoreProvider),
    ("redb", open_redb as StoreProvider),
];

/// Resolve a store descriptor such as `mem://access/Code` or `redb://./data`.
pub fn open_store(uri: &str) -> Result<Arc<dyn CodeStore>, StoreError> {
    let descriptor = Descriptor::parse(uri)?;

    let provider = STORE_PROVIDERS
        .iter()
        .find(|(scheme, _)| *scheme == descriptor.scheme())
        .map(|(_, provider)| provider)
        .ok_or_else(|| StoreError::UnsupportedScheme {
            available: schemes().join(", "),
            scheme: descriptor.scheme().to_string(),
        })?;

    let store = provider(&descriptor)?;
    tracing::info!(scheme = %descriptor.scheme(), "Opened access code store");
    Ok(store)
}

/// Registered store schemes.
pub fn schemes() -> Vec<&'static str> {
    STORE_PROVIDERS.iter().map(|(scheme, _)| *scheme).collect()
}

fn open_memory(_descriptor: &Descriptor) -> Result<Arc<dyn CodeStore>, StoreError> {
    Ok(Arc::new(MemoryCodeStore::new()))
}

fn open_redb(descriptor: &Descriptor) -> Result<Arc<dyn CodeStore>, StoreError> {
    let data_dir = match descriptor.target() {
        "" => "./data",
        dir => dir,
    };
    Ok(Arc::new(Database::open(data_dir)?))
}
