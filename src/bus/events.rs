use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::relay::envelope::UpdateEnvelope;
use crate::storage::models::AccessCode;

/// Event type telling receivers to display an access code.
pub const SHOW_CODE: &str = "showCode";

/// Event type telling receivers to hide the access code prompt.
pub const HIDE_CODE: &str = "hideCode";

/// An event handed to the external delivery component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DeliveryEvent {
    /// Reveal `code` on the receiver display.
    pub fn code_reveal(code: &AccessCode) -> Self {
        Self {
            data: Some(json!({
                "code": code.code,
                "created": code.created,
                "expires": code.expires,
                "lastupdate": code.last_update,
            })),
            kind: SHOW_CODE.to_string(),
        }
    }

    pub fn hide_code() -> Self {
        Self {
            data: None,
            kind: HIDE_CODE.to_string(),
        }
    }

    /// Relay a controller update. The body is wrapped as `{"body": ...}` so
    /// receivers always get an object.
    pub fn from_update(update: UpdateEnvelope) -> Self {
        Self {
            data: Some(json!({ "body": update.body })),
            kind: update.kind,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
