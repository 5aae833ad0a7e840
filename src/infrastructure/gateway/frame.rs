//! Gateway wire frames.
//!
//! The gateway speaks a framed protocol over WebSocket: one JSON object per
//! message, discriminated by `type`. Three kinds exist: `req` (client to
//! server), `res` (correlated reply) and `event` (server push with a
//! per-connection sequence number).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body inside a failed `res` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client request
    Req {
        id: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    /// Correlated server reply
    Res {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteErrorBody>,
    },
    /// Server push
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default)]
        seq: Option<i64>,
    },
}

impl Frame {
    /// Build a request frame.
    pub fn req(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self::Req { id: id.into(), method: method.into(), params: Some(params) }
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
