//! # System Constants
//!
//! Protocol names, timing defaults and event names shared by the sequencer
//! and the shadow client.

use serde_json::{json, Value};

/// Timing defaults for the sequencer and the deadline timer
pub mod timing {
    /// Re-evaluation interval once the sequence has ended
    pub const IDLE_POLL_SECONDS: u64 = 60;
    /// Lead margin added to a part's preload duration
    pub const PRELOAD_MARGIN_MS: u64 = 1_000;
    /// Below this remaining distance the deadline timer waits out the rest in one step
    pub const CONVERGENCE_THRESHOLD_MS: u64 = 250;
    /// Share of the remaining distance slept per convergence step
    pub const CONVERGENCE_FACTOR: f64 = 0.75;
    /// Preload lead used by the default part metadata
    pub const DEFAULT_PRELOAD_SECONDS: f64 = 15.0;
}

/// Timeline constants
pub mod timeline {
    /// Type given to synthetic parts that fill gaps between real parts
    pub const NULL_PART_TYPE: &str = "none";
    /// Default playback speed
    pub const DEFAULT_SPEED: f64 = 1.0;
}

/// Shadow protocol constants
pub mod shadow {
    pub const ACTION_GET: &str = "get";
    pub const ACTION_UPDATE: &str = "update";
    pub const ACTION_REGISTER: &str = "register";
    pub const ACTION_UNREGISTER: &str = "unregister";
    pub const ACTION_PUBLISH: &str = "publish";

    /// Status result reported by the transport for a rejected request
    pub const STATUS_REJECTED: &str = "rejected";
    /// Status result reported by the transport for an accepted request
    pub const STATUS_ACCEPTED: &str = "accepted";

    /// Default topic prefix for the last-will message
    pub const LAST_WILL_TOPIC_PREFIX: &str = "lwt";
}

/// Application events emitted by the shadow client
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const CLOSE: &str = "close";
    pub const OFFLINE: &str = "offline";
    pub const THING_SHADOW_CHANGED: &str = "thingShadowChanged";
}

/// Payload published by the broker when the client disconnects abruptly
pub fn last_will_payload() -> Value {
    json!({
        "state": {
            "reported": {
                "system": { "connected": false }
            }
        }
    })
}
