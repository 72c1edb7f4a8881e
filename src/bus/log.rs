use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::events::DeliveryEvent;
use super::{BusError, EventBus};

/// Event bus that writes every event to the `relay::bus` tracing target.
///
/// Selected by `log://<channel>` descriptors; handy when no delivery
/// component is attached.
pub struct LogBus {
    channel: String,
    closed: AtomicBool,
}

impl LogBus {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventBus for LogBus {
    async fn publish(&self, event: &DeliveryEvent) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let encoded = event.encode()?;
        tracing::info!(target: "relay::bus", channel = %self.channel, event = %encoded, "Published event");
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_bus_publish_and_close() {
        let bus = LogBus::new("relay");
        bus.publish(&DeliveryEvent::hide_code()).await.unwrap();

        bus.close().await.unwrap();
        bus.close().await.unwrap();
        assert!(matches!(
            bus.publish(&DeliveryEvent::hide_code()).await,
            Err(BusError::Closed)
        ));
    }
}
