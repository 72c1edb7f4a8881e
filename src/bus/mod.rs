//! Event bus used to hand delivery events to the external broadcast
//! component.
//!
//! Producers depend only on [`EventBus`]. Transports are registered in
//! [`BUS_PROVIDERS`] and picked once at startup from the descriptor scheme.

pub mod events;
pub mod log;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::{Descriptor, DescriptorError};

pub use events::DeliveryEvent;
pub use log::LogBus;
pub use memory::MemoryBus;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus is closed")]
    Closed,
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid bus parameter {name}={value:?}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unsupported bus scheme '{scheme}' (available: {available})")]
    UnsupportedScheme { available: String, scheme: String },
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &DeliveryEvent) -> Result<(), BusError>;

    /// Release the transport. Calling this more than once is harmless.
    async fn close(&self) -> Result<(), BusError>;
}

type BusProvider = fn(&Descriptor) -> Result<Arc<dyn EventBus>, BusError>;

/// Bus transports keyed by descriptor scheme.
pub const BUS_PROVIDERS: &[(&str, BusProvider)] = &[
    ("log", open_log as BusProvider),
    ("mem", open_memory as BusProvider),
];

/// Resolve a bus descriptor such as `mem://relay?capacity=256` or `log://relay`.
pub fn open_bus(uri: &str) -> Result<Arc<dyn EventBus>, BusError> {
    let descriptor = Descriptor::parse(uri)?;

    let provider = BUS_PROVIDERS
        .iter()
        .find(|(scheme, _)| *scheme == descriptor.scheme())
        .map(|(_, provider)| provider)
        .ok_or_else(|| BusError::UnsupportedScheme {
            available: schemes().join(", "),
            scheme: descriptor.scheme().to_string(),
        })?;

    let bus = provider(&descriptor)?;
    tracing::info!(scheme = %descriptor.scheme(), "Opened event bus");
    Ok(bus)
}

/// Registered bus schemes.
pub fn schemes() -> Vec<&'static str> {
    BUS_PROVIDERS.iter().map(|(scheme, _)| *scheme).collect()
}

fn open_memory(descriptor: &Descriptor) -> Result<Arc<dyn EventBus>, BusError> {
    let capacity = match descriptor.param("capacity") {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| BusError::InvalidParameter {
                name: "capacity",
                value: raw.to_string(),
            })?,
        None => memory::DEFAULT_CHANNEL_CAPACITY,
    };
    Ok(Arc::new(MemoryBus::with_capacity(capacity)))
}

fn open_log(descriptor: &Descriptor) -> Result<Arc<dyn EventBus>, BusError> {
    Ok(Arc::new(LogBus::new(descriptor.target())))
}
