// MIT License - Copyright (c) 2026 Peter Wright
// Error types for the Arlo bridge

use crate::mode::Mode;

/// All errors that can occur while bridging the base station to MQTT.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The cloud returned no usable mode. Usually means the session went stale.
    #[error("[{station}] unreadable alarm mode")]
    TransientReadFailure { station: String },

    #[error("[{station}] login failed: {reason}")]
    AuthFailure { station: String, reason: String },

    #[error("[{station}] failed to set mode {mode}: {reason}")]
    CommandApplyFailure {
        station: String,
        mode: Mode,
        reason: String,
    },

    #[error("MQTT client error: {0}")]
    Bus(#[from] rumqttc::ClientError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud API error: {reason}")]
    Cloud { reason: String },

    #[error("No base station found on the account")]
    NoBaseStation,

    #[error("Mode {0} cannot be requested from the base station")]
    UnsupportedMode(Mode),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
