use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::events::DeliveryEvent;
use super::{BusError, EventBus};

/// Maximum encoded events buffered per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// In-process event bus backed by `tokio::sync::broadcast`.
///
/// Subscribers receive JSON-encoded [`DeliveryEvent`]s. Publishing while no
/// subscriber is attached succeeds and drops the event.
pub struct MemoryBus {
    closed: AtomicBool,
    events_published: AtomicU64,
    sender: broadcast::Sender<String>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            closed: AtomicBool::new(false),
            events_published: AtomicU64::new(0),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, event: &DeliveryEvent) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let encoded = event.encode()?;
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(encoded) {
            Ok(receivers) => debug!(kind = %event.kind, receivers, "Event published"),
            Err(_) => debug!(kind = %event.kind, "Event dropped (no subscribers)"),
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closed in-memory event bus");
        }
        Ok(())
    }
}
