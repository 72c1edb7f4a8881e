//! Access code minting, rotation and pruning.
//!
//! A code is Created when minted, Active until `created + ttl`, and
//! Expired until the next prune removes it. Rotation only mints when no
//! active code exists, so concurrent triggers cannot double-issue.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::generator::generate_code;
use super::unix_now;
use crate::bus::{BusError, DeliveryEvent, EventBus};
use crate::storage::models::AccessCode;
use crate::storage::{CodeStore, StoreError};
use crate::AppState;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to publish access code: {0}")]
    Bus(#[from] BusError),
    #[error("Access code store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a rotation check.
#[derive(Debug, Clone, PartialEq)]
pub enum Rotation {
    /// An unexpired code already exists
    Kept(AccessCode),
    /// A new code was minted and revealed
    Minted(AccessCode),
}

impl Rotation {
    pub fn code(&self) -> &AccessCode {
        match self {
            Rotation::Kept(code) | Rotation::Minted(code) => code,
        }
    }
}

#[derive(Clone)]
pub struct CodeLifecycleManager {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn CodeStore>,
    ttl_seconds: u64,
}

impl CodeLifecycleManager {
    pub fn new(store: Arc<dyn CodeStore>, bus: Arc<dyn EventBus>, ttl_seconds: u64) -> Self {
        Self {
            bus,
            store,
            ttl_seconds,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::clone(&state.store),
            Arc::clone(&state.bus),
            state.config.codes.ttl_seconds,
        )
    }

    /// Prune everything already expired, then make sure one active code exists.
    pub async fn startup(&self, now: i64) -> Result<AccessCode, LifecycleError> {
        let pruned = self.prune(now).await?;
        if pruned > 0 {
            info!(count = pruned, "Pruned expired access codes at startup");
        }

        let rotation = self.rotate(now).await?;
        if let Rotation::Kept(code) = &rotation {
            info!(code = %code.code, expires = code.expires, "Reusing unexpired access code");
        }
        Ok(rotation.code().clone())
    }

    /// Mint and reveal a new code unless an active one already exists.
    pub async fn rotate(&self, now: i64) -> Result<Rotation, LifecycleError> {
        if let Some(current) = self.store.current_active(self.ttl_seconds, now).await? {
            debug!(code = %current.code, expires = current.expires, "Active access code still valid");
            return Ok(Rotation::Kept(current));
        }

        Ok(Rotation::Minted(self.mint(now).await?))
    }

    /// Persist a fresh code and publish a code-reveal event for it.
    pub async fn mint(&self, now: i64) -> Result<AccessCode, LifecycleError> {
        let code = AccessCode::new(generate_code(), now, self.ttl_seconds);
        self.store.create(&code).await?;
        self.bus.publish(&DeliveryEvent::code_reveal(&code)).await?;

        info!(code = %code.code, expires = code.expires, "Minted access code");
        Ok(code)
    }

    /// Delete every code with `expires < cutoff`.
    pub async fn prune(&self, cutoff: i64) -> Result<usize, LifecycleError> {
        Ok(self.store.delete_expired(cutoff).await?)
    }
}

/// Start the background rotation task, ticking every access-code TTL.
pub fn start_code_rotation(state: Arc<AppState>) -> JoinHandle<()> {
    let period = state.config.codes.rotation_interval();
    let manager = CodeLifecycleManager::from_state(&state);
    let cancel = state.shutdown.child_token();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Code rotation stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = manager.rotate(unix_now()).await {
                        error!(error = %e, "Failed to rotate access code");
                    }
                }
            }
        }
    })
}
