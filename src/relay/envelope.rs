use serde::{Deserialize, Serialize};

/// Message type a controller sends to check liveness.
pub const PING: &str = "ping";

/// An inbound controller message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    #[serde(default)]
    pub body: serde_json::Value,
    /// Access code the controller was given
    #[serde(default)]
    pub code: String,
    /// Message type; an absent type is relayed as `""`
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl UpdateEnvelope {
    pub fn is_ping(&self) -> bool {
        self.kind == PING
    }
}

/// Plain-text acknowledgments written back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Expired,
    Invalid,
    Pong,
    Relay,
}

impl Reply {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reply::Expired => "expired",
            Reply::Invalid => "invalid",
            Reply::Pong => "pong",
            Reply::Relay => "relay",
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
