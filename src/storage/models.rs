use serde::{Deserialize, Serialize};

/// A short-lived access code pairing a controller with the receiver display.
///
/// All timestamps are Unix seconds. `last_update == 0` means the code has
/// never been claimed by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCode {
    /// Opaque alphanumeric token
    pub code: String,
    /// When the code was minted
    pub created: i64,
    /// When the code expires (`created + ttl`)
    pub expires: i64,
    /// When a controller last used the code (0 = never)
    #[serde(rename = "lastupdate", default)]
    pub last_update: i64,
}

impl AccessCode {
    pub fn new(code: String, created: i64, ttl_seconds: u64) -> Self {
        Self {
            code,
            created,
            expires: created.saturating_add(ttl_as_secs(ttl_seconds)),
            last_update: 0,
        }
    }

    pub fn is_unused(&self) -> bool {
        self.last_update == 0
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires < now
    }
}

/// A TTL as signed seconds, clamped to `i64::MAX`.
pub fn ttl_as_secs(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
}

/// An access code as persisted by a store, tagged with its creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCode {
    pub code: AccessCode,
    /// Monotonic per-store sequence, breaks ties between equal `created` values
    pub seq: u64,
}

impl StoredCode {
    /// Ordering key by creation time, then creation order.
    pub fn created_key(&self) -> (i64, u64) {
        (self.code.created, self.seq)
    }

    pub fn expiry_key(&self) -> (i64, u64) {
        (self.code.expires, self.seq)
    }
}
