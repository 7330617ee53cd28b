// MIT License - Copyright (c) 2026 Peter Wright
//
//! # arlo2mqtt
//!
//! Bridges the alarm mode of an Arlo base station to MQTT, so home-automation
//! controllers can arm and disarm it through an MQTT alarm control panel
//! instead of the vendor cloud API.
//!
//! The cloud is polled continuously and any change of mode is published
//! (retained) on the state topic. Commands received on the command topic are
//! announced as `pending` right away and forwarded to the cloud after a
//! configurable delay.
//!
//! ## Quick Start
//!
//! ```no_run
//! use arlo2mqtt::{ArloSession, Bridge, CloudSession, ConfigFile, mqtt};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let file = ConfigFile::from_toml_str(&std::fs::read_to_string("config.toml")?)?;
//!     let config = file.bridge_config();
//!
//!     let mut session = ArloSession::new(&file.arlo)?;
//!     session.login().await?;
//!
//!     let opts = mqtt::mqtt_options(&file.mqtt, &config.availability_topic);
//!     let (client, eventloop) = rumqttc::AsyncClient::new(opts, 64);
//!     let command_topic = config.command_topic.clone();
//!     let availability_topic = config.availability_topic.clone();
//!
//!     let bridge = Bridge::new(config, Box::new(session), std::sync::Arc::new(client.clone()));
//!     tokio::spawn(mqtt::run_event_loop(
//!         eventloop,
//!         client,
//!         bridge.clone(),
//!         command_topic,
//!         availability_topic,
//!     ));
//!     bridge.start().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cloud;
pub mod config;
pub mod error;
pub mod mode;
pub mod mqtt;
pub mod timer;

// Re-exports for convenience
pub use bridge::Bridge;
pub use cloud::CloudSession;
pub use cloud::arlo::ArloSession;
pub use config::{BridgeConfig, BridgeConfigBuilder, ConfigFile};
pub use error::{BridgeError, Result};
pub use mode::{Command, Mode};
pub use mqtt::BusClient;
pub use timer::{TimerHandle, TimerSlot, schedule_once};
