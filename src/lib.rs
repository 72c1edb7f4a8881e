//! multiscreen-relay - relays controller updates to a receiver display
//!
//! A receiver shows a short-lived access code. Controllers connect over a
//! WebSocket, present the code with each update, and the relay forwards
//! accepted updates to an event bus for delivery. This crate provides:
//! - Access code minting, rotation and pruning
//! - The WebSocket ingest endpoint with staleness checks
//! - Pluggable code stores (in-memory, redb) and event buses
//! - A small REST surface (code reveal, health)

pub mod api;
pub mod bus;
pub mod codes;
pub mod config;
pub mod descriptor;
pub mod expiration;
pub mod relay;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bus::EventBus;
use config::Config;
use storage::CodeStore;

/// Shared application state
pub struct AppState {
    pub bus: Arc<dyn EventBus>,
    pub config: Config,
    /// Process-wide shutdown signal; tasks and connections use child tokens
    pub shutdown: CancellationToken,
    pub store: Arc<dyn CodeStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CodeStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            config,
            shutdown: CancellationToken::new(),
            store,
        }
    }
}
