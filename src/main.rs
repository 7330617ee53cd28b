// MIT License - Copyright (c) 2026 Peter Wright
// Arlo alarm panel MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::AsyncClient;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Duration, timeout};
use tracing::{info, warn};

use arlo2mqtt::{ArloSession, Bridge, CloudSession, ConfigFile, mqtt};

const MQTT_CHANNEL_CAPACITY: usize = 64;
const MQTT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "arlo2mqtt")]
#[command(about = "Bridge between an Arlo base station's alarm mode and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

fn load_config(path: &str) -> Result<ConfigFile> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    ConfigFile::from_toml_str(&text).context("Failed to parse config file")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=arlo2mqtt=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        info!("Starting Arlo alarm control panel bridge");
        let bridge_config = config.bridge_config();

        // The bridge is only started once the cloud session is usable
        let mut session = ArloSession::new(&config.arlo).context("Failed to create Arlo client")?;
        session.login().await.context("Arlo login failed")?;
        let station = session.station_name().to_string();

        let opts = mqtt::mqtt_options(&config.mqtt, &bridge_config.availability_topic);
        let (client, eventloop) = AsyncClient::new(opts, MQTT_CHANNEL_CAPACITY);
        info!(
            "[{station}] Connecting to MQTT broker at {}:{}",
            config.mqtt.host, config.mqtt.port
        );

        let command_topic = bridge_config.command_topic.clone();
        let availability_topic = bridge_config.availability_topic.clone();
        let bridge = Bridge::new(bridge_config, Box::new(session), Arc::new(client.clone()));

        let mut mqtt_handle = tokio::spawn(mqtt::run_event_loop(
            eventloop,
            client,
            Arc::clone(&bridge),
            command_topic,
            availability_topic,
        ));

        bridge.start().await;

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        bridge.shutdown().await;

        // Let the event loop flush the offline message and the disconnect
        if timeout(MQTT_FLUSH_TIMEOUT, &mut mqtt_handle).await.is_err() {
            warn!("MQTT event loop did not stop in time, aborting it");
            mqtt_handle.abort();
        }

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => {
                config = new_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}
