// MIT License - Copyright (c) 2026 Peter Wright
// Bridge configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::mode::{Command, Mode};

pub const DEFAULT_STATE_TOPIC: &str = "home/alarm";
pub const DEFAULT_COMMAND_TOPIC: &str = "home/alarm/set";
pub const DEFAULT_AVAILABILITY_TOPIC: &str = "home/alarm/availability";
pub const DEFAULT_ARLO_BASE_URL: &str = "https://my.arlo.com/hmsweb";

/// Resolved, immutable configuration of the bridge state machine.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Topic the alarm mode is published on
    pub state_topic: String,
    /// Topic commands are received on
    pub command_topic: String,
    /// Topic carrying `online` / `offline`
    pub availability_topic: String,
    /// Delay before a command is sent to the cloud when no per-mode override exists
    pub default_pending: Duration,
    /// Per-target-mode delay overrides
    pub pending_overrides: HashMap<Mode, Duration>,
    /// Interval between reconciliation polls
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_topic: DEFAULT_STATE_TOPIC.to_string(),
            command_topic: DEFAULT_COMMAND_TOPIC.to_string(),
            availability_topic: DEFAULT_AVAILABILITY_TOPIC.to_string(),
            default_pending: Duration::ZERO,
            pending_overrides: HashMap::new(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Delay between receiving `cmd` and asking the cloud to apply it.
    pub fn pending_delay(&self, cmd: Command) -> Duration {
        self.pending_overrides
            .get(&cmd.target())
            .copied()
            .unwrap_or(self.default_pending)
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn state_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.state_topic = topic.into();
        self
    }

    pub fn command_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.command_topic = topic.into();
        self
    }

    pub fn availability_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.availability_topic = topic.into();
        self
    }

    pub fn default_pending(mut self, delay: Duration) -> Self {
        self.config.default_pending = delay;
        self
    }

    pub fn pending_override(mut self, mode: Mode, delay: Duration) -> Self {
        self.config.pending_overrides.insert(mode, delay);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// ---------------------------------------------------------------------------
// TOML file
// ---------------------------------------------------------------------------

/// Top-level layout of the TOML configuration file.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub arlo: ArloToml,
    pub mqtt: MqttToml,
    /// Default pending delay in seconds
    #[serde(default)]
    pub pending_time: u64,
    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
    #[serde(default = "default_command_topic")]
    pub command_topic: String,
    #[serde(default = "default_availability_topic")]
    pub availability_topic: String,
    #[serde(default)]
    pub disarmed: Option<ModeToml>,
    #[serde(default)]
    pub armed_away: Option<ModeToml>,
    #[serde(default)]
    pub armed_home: Option<ModeToml>,
}

#[derive(Debug, Deserialize)]
pub struct ArloToml {
    pub username: String,
    pub password: String,
    #[serde(default = "default_arlo_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct MqttToml {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

/// Per-mode settings table, e.g. `[armed_away]`.
#[derive(Debug, Default, Deserialize)]
pub struct ModeToml {
    #[serde(default)]
    pub pending_time: Option<u64>,
}

fn default_poll_interval() -> u64 {
    1
}
fn default_state_topic() -> String {
    DEFAULT_STATE_TOPIC.to_string()
}
fn default_command_topic() -> String {
    DEFAULT_COMMAND_TOPIC.to_string()
}
fn default_availability_topic() -> String {
    DEFAULT_AVAILABILITY_TOPIC.to_string()
}
fn default_arlo_base_url() -> String {
    DEFAULT_ARLO_BASE_URL.to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "arlo2mqtt".to_string()
}

impl ConfigFile {
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve the state machine settings, applying defaults once.
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut builder = BridgeConfig::builder()
            .state_topic(&self.state_topic)
            .command_topic(&self.command_topic)
            .availability_topic(&self.availability_topic)
            .default_pending(Duration::from_secs(self.pending_time))
            .poll_interval(Duration::from_secs(self.poll_interval.max(1)));

        let overrides = [
            (Mode::Disarmed, &self.disarmed),
            (Mode::ArmedAway, &self.armed_away),
            (Mode::ArmedHome, &self.armed_home),
        ];
        for (mode, table) in overrides {
            if let Some(secs) = table.as_ref().and_then(|t| t.pending_time) {
                builder = builder.pending_override(mode, Duration::from_secs(secs));
            }
        }
        builder.build()
    }
}
