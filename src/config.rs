//! Controller configuration

use serde::{Deserialize, Serialize};

use crate::protocol::SUBPROTOCOL;

/// Default client-side ceiling on one upload payload (1 MiB, SPIFFS scale).
/// The device applies its own limit on top and refuses with `tooLarge`.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;

/// Configuration for one device link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// WebSocket endpoint, e.g. `ws://esp.local/ws`.
    pub url: String,
    /// Subprotocol offered at open time; the device rejects connections
    /// that do not offer it.
    #[serde(default = "default_subprotocol")]
    pub subprotocol: String,
    /// Client-side ceiling on one upload payload in bytes.
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: u64,
}

fn default_subprotocol() -> String {
    SUBPROTOCOL.to_string()
}

fn default_max_payload() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

impl LinkConfig {
    /// Create a config for the given endpoint with default limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subprotocol: default_subprotocol(),
            max_payload_bytes: default_max_payload(),
        }
    }
}
